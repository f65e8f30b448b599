//! Integration tests for account authorization

use std::sync::Arc;

use polysync_core::domain::FaultKind;
use polysync_http::auth::{AccountAuthorizer, AccountKey};
use polysync_http::{ApiClient, AuthScheme, Credentials, RequestEnvelope};
use reqwest::Method;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// `Basic base64("key-id:secret")`
const BASIC_AUTH: &str = "Basic a2V5LWlkOnNlY3JldA==";

fn authorizer(server: &MockServer) -> AccountAuthorizer {
    AccountAuthorizer::new(
        reqwest::Client::new(),
        format!("{}/authorize_account", server.uri()),
        AccountKey::new("key-id", "secret"),
    )
}

#[tokio::test]
async fn test_authorize_with_basic_auth() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/authorize_account"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "authorization_token": "4_session",
            "api_url": "https://api005.example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (credentials, api_url) = authorizer(&server).authorize().await.expect("authorize failed");
    assert_eq!(credentials.token(), "4_session");
    assert_eq!(credentials.scheme(), AuthScheme::Raw);
    assert_eq!(api_url.as_deref(), Some("https://api005.example.com"));
}

#[tokio::test]
async fn test_rejected_key_is_authentication_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/authorize_account"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "status": 401,
            "code": "unauthorized",
            "message": "invalid key"
        })))
        .mount(&server)
        .await;

    let err = authorizer(&server).authorize().await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::AuthenticationFailed);
}

#[tokio::test]
async fn test_authorizer_refreshes_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/authorize_account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "authorization_token": "4_renewed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/root"))
        .and(header("authorization", "4_expired"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "status": 401, "code": "expired_auth_token", "message": "expired"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/root"))
        .and(header("authorization", "4_renewed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "root"})))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = RequestEnvelope::new(reqwest::Client::new(), Credentials::raw("4_expired"))
        .with_refresher(Arc::new(authorizer(&server)));
    let client = ApiClient::new(Arc::new(envelope), server.uri());

    let body: serde_json::Value = client
        .send_json(&client.request(Method::GET, "/files/root"))
        .await
        .unwrap();
    assert_eq!(body["id"], "root");
    assert_eq!(client.envelope().refresh_count(), 1);
}
