//! Integration tests for the JSON multipart upload binding
//!
//! Drives a full `MultipartUpload` session against the mock server:
//! start, part target, one request per part (hash echoed back), finish
//! with the ordered part hashes, and cancel on abort, size mismatch, a
//! rejected part or a refused finish.

use std::sync::Arc;

use polysync_core::domain::{FaultKind, HashKind, SyncFault};
use polysync_core::ports::IWriteStream;
use polysync_http::multipart::HttpMultipartBackend;
use polysync_transfer::{compute_hash, SessionState};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, pattern, update_for, PartEchoResponder};

async fn mount_session(server: &MockServer, corrupt: bool) {
    Mock::given(method("POST"))
        .and(path("/uploads/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"file_id": "f-1"})))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/uploads/f-1/part-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "upload_url": format!("{}/upload/f-1?sig=secret", server.uri())
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload/f-1"))
        .respond_with(PartEchoResponder { corrupt })
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_upload_in_parts_and_finish() {
    let (server, client) = common::setup_mock().await;
    mount_session(&server, false).await;

    let data = pattern(25);
    let expected_hashes: Vec<String> = data
        .chunks(10)
        .map(|part| compute_hash(HashKind::Sha1, part).to_hex())
        .collect();

    Mock::given(method("POST"))
        .and(path("/uploads/f-1/finish"))
        .and(body_json(serde_json::json!({"part_sha1_array": expected_hashes})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "item_id": "item-9",
            "size": 25
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(HttpMultipartBackend::new(client));
    let update = update_for("docs/report.pdf");
    let upload = backend.open(&update, 25, 10).await.expect("start failed");
    assert_eq!(upload.state(), SessionState::Created);

    let mut stream: Box<dyn IWriteStream> = Box::new(upload);
    for piece in data.chunks(7) {
        stream.write(piece).await.expect("write failed");
    }
    assert_eq!(stream.bytes_written(), 25);

    let committed = stream.commit().await.expect("commit failed");
    assert_eq!(committed.item_id.as_str(), "item-9");
    assert_eq!(committed.size, 25);

    let requests = server.received_requests().await.unwrap();
    let part_numbers: Vec<String> = requests
        .iter()
        .filter(|r| r.url.path() == "/upload/f-1")
        .map(|r| r.headers.get("x-part-number").unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(part_numbers, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_mismatched_part_hash_faults_session() {
    let (server, client) = common::setup_mock().await;
    mount_session(&server, true).await;

    Mock::given(method("POST"))
        .and(path("/uploads/f-1/cancel"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(HttpMultipartBackend::new(client));
    let update = update_for("big.bin");
    let mut upload = backend.open(&update, 20, 10).await.unwrap();

    let err = upload.write(&pattern(10)).await.unwrap_err();
    assert!(matches!(err, SyncFault::IntegrityMismatch { part_number: 1, .. }));
    assert_eq!(err.kind(), FaultKind::Integrity);
    assert_eq!(upload.state(), SessionState::Faulted);

    let err = upload.write(&pattern(5)).await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::ContractViolation);

    let stream: Box<dyn IWriteStream> = Box::new(upload);
    stream.abort().await.expect("discarding the faulted upload failed");
}

#[tokio::test]
async fn test_refused_finish_discards_remote_upload() {
    let (server, client) = common::setup_mock().await;
    mount_session(&server, false).await;

    Mock::given(method("POST"))
        .and(path("/uploads/f-1/finish"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "status": 400,
            "code": "bad_request",
            "message": "sha1 did not match"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/uploads/f-1/cancel"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(HttpMultipartBackend::new(client));
    let mut upload = backend.open(&update_for("a.bin"), 20, 10).await.unwrap();
    upload.write(&pattern(20)).await.unwrap();

    let stream: Box<dyn IWriteStream> = Box::new(upload);
    let err = stream.commit().await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::Remote);
    assert_eq!(err.remote().unwrap().status, 400);
}

#[tokio::test]
async fn test_abort_cancels_remote_upload() {
    let (server, client) = common::setup_mock().await;
    mount_session(&server, false).await;

    Mock::given(method("POST"))
        .and(path("/uploads/f-1/cancel"))
        .and(header("authorization", "Bearer stale-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(HttpMultipartBackend::new(client));
    let mut upload = backend.open(&update_for("a.bin"), 30, 10).await.unwrap();
    upload.write(&pattern(12)).await.unwrap();
    assert_eq!(upload.state(), SessionState::PartsInFlight);

    let stream: Box<dyn IWriteStream> = Box::new(upload);
    stream.abort().await.expect("abort failed");
}

#[tokio::test]
async fn test_short_write_never_finishes() {
    let (server, client) = common::setup_mock().await;
    mount_session(&server, false).await;

    Mock::given(method("POST"))
        .and(path("/uploads/f-1/finish"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/uploads/f-1/cancel"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(HttpMultipartBackend::new(client));
    let mut upload = backend.open(&update_for("a.bin"), 30, 10).await.unwrap();
    upload.write(&pattern(15)).await.unwrap();

    let stream: Box<dyn IWriteStream> = Box::new(upload);
    let err = stream.commit().await.unwrap_err();
    assert!(matches!(
        err,
        SyncFault::SizeMismatch {
            declared: 30,
            actual: 15
        }
    ));
}

#[tokio::test]
async fn test_start_failure_is_translated() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/uploads/start"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "status": 503,
            "code": "service_unavailable",
            "message": "try again later"
        })))
        .mount(&server)
        .await;

    let backend = Arc::new(HttpMultipartBackend::new(client));
    let err = backend
        .open(&update_for("a.bin"), 30, 10)
        .await
        .err()
        .expect("start should fail");
    assert_eq!(err.kind(), FaultKind::Transient);
    assert_eq!(err.remote().unwrap().code.as_deref(), Some("service_unavailable"));
}
