//! Integration tests for the resilient request envelope
//!
//! Verifies that an expired-credential response triggers exactly one
//! refresh and a byte-identical replay, and that everything else is
//! translated into a uniform fault without retrying.

use polysync_core::domain::{FaultKind, SyncFault};
use reqwest::Method;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, bearer, FRESH_TOKEN, STALE_TOKEN};

#[tokio::test]
async fn test_success_needs_no_refresh() {
    let (server, client, refresher) = common::setup_mock_with_refresher().await;

    Mock::given(method("GET"))
        .and(path("/files/root"))
        .and(header("authorization", bearer(STALE_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "root"})))
        .expect(1)
        .mount(&server)
        .await;

    let body: serde_json::Value = client
        .send_json(&client.request(Method::GET, "/files/root"))
        .await
        .expect("request failed");

    assert_eq!(body["id"], "root");
    assert_eq!(refresher.calls(), 0);
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_replayed() {
    let (server, client, refresher) = common::setup_mock_with_refresher().await;
    let payload = serde_json::json!({"path": "docs/a.txt", "size": 42});

    Mock::given(method("POST"))
        .and(path("/uploads/start"))
        .and(header("authorization", bearer(STALE_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "status": 401,
            "code": "expired_auth_token",
            "message": "Authorization token has expired"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/uploads/start"))
        .and(header("authorization", bearer(FRESH_TOKEN).as_str()))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"file_id": "f-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let request = client
        .request(Method::POST, "/uploads/start")
        .json(&payload)
        .unwrap();
    let body: serde_json::Value = client.send_json(&request).await.expect("replay failed");

    assert_eq!(body["file_id"], "f-1");
    assert_eq!(refresher.calls(), 1);
    assert_eq!(client.envelope().refresh_count(), 1);
    assert_eq!(client.envelope().credentials().await.token(), FRESH_TOKEN);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);
}

#[tokio::test]
async fn test_second_auth_failure_is_fatal_after_one_refresh() {
    let (server, client, refresher) = common::setup_mock_with_refresher().await;

    Mock::given(method("GET"))
        .and(path("/files/root"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "code": "bad_auth_token",
            "message": "Invalid authorization token"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let err = client
        .send(&client.request(Method::GET, "/files/root"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FaultKind::AuthenticationFailed);
    assert!(err.is_unrecoverable());
    let remote = err.remote().unwrap();
    assert_eq!(remote.status, 401);
    assert_eq!(remote.code.as_deref(), Some("bad_auth_token"));
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_non_auth_failure_is_translated_without_retry() {
    let (server, client, refresher) = common::setup_mock_with_refresher().await;

    Mock::given(method("GET"))
        .and(path("/files/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"code": "itemNotFound", "message": "The resource could not be found."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .send(&client.request(Method::GET, "/files/missing"))
        .await
        .unwrap_err();

    match err {
        SyncFault::Remote(fault) => {
            assert_eq!(fault.status, 404);
            assert_eq!(fault.code.as_deref(), Some("itemNotFound"));
            assert_eq!(fault.message, "The resource could not be found.");
        }
        other => panic!("unexpected fault: {other:?}"),
    }
    assert_eq!(refresher.calls(), 0);
}

#[tokio::test]
async fn test_provider_code_triggers_refresh_on_non_401() {
    let (server, client, refresher) = common::setup_mock_with_refresher().await;

    Mock::given(method("GET"))
        .and(path("/files/root"))
        .and(header("authorization", bearer(STALE_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "status": 400,
            "code": "expired_auth_token",
            "message": "expired"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/root"))
        .and(header("authorization", bearer(FRESH_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    client
        .send(&client.request(Method::GET, "/files/root"))
        .await
        .expect("request should succeed after refresh");
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_failure_after_refresh_is_reported_as_remote() {
    let (server, client, _refresher) = common::setup_mock_with_refresher().await;

    Mock::given(method("GET"))
        .and(path("/files/root"))
        .and(header("authorization", bearer(STALE_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/root"))
        .and(header("authorization", bearer(FRESH_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client
        .send(&client.request(Method::GET, "/files/root"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FaultKind::Transient);
    assert_eq!(err.remote().unwrap().message, "maintenance");
}

#[tokio::test]
async fn test_auth_failure_without_refresher() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("GET"))
        .and(path("/files/root"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .send(&client.request(Method::GET, "/files/root"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FaultKind::AuthenticationFailed);
}

#[tokio::test]
async fn test_xml_error_payload() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("GET"))
        .and(path("/files/a.txt"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            "<?xml version=\"1.0\"?><Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
        ))
        .mount(&server)
        .await;

    let err = client
        .send(&client.request(Method::GET, "/files/a.txt"))
        .await
        .unwrap_err();
    let remote = err.remote().unwrap();
    assert_eq!(remote.status, 403);
    assert_eq!(remote.code.as_deref(), Some("AccessDenied"));
    assert_eq!(remote.message, "Access Denied");
}

#[tokio::test]
async fn test_unauthenticated_request_carries_no_authorization() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("GET"))
        .and(path("/signed/object"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let request = client
        .request(Method::GET, "/signed/object")
        .unauthenticated();
    client.send(&request).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_transport_failure() {
    let client = polysync_http::ApiClient::with_base_url(STALE_TOKEN, "http://127.0.0.1:9");
    let err = client
        .send(&client.request(Method::GET, "/files/root"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncFault::Transport(_)));
    assert_eq!(err.kind(), FaultKind::Transient);
}
