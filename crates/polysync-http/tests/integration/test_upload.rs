//! Integration tests for single-shot uploads

use polysync_core::domain::{FaultKind, HashKind, SyncFault};
use polysync_core::ports::IWriteStream;
use polysync_http::upload::{upload_single, BufferedUpload};
use polysync_transfer::compute_hash;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, pattern, update_for};

#[tokio::test]
async fn test_upload_single_sends_hash_and_returns_item() {
    let (server, client) = common::setup_mock().await;
    let data = pattern(64);
    let sha1 = compute_hash(HashKind::Sha1, &data).to_hex();

    Mock::given(method("PUT"))
        .and(path("/files/notes/todo.txt"))
        .and(header("x-content-sha1", sha1.as_str()))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "item_id": "item-1",
            "size": 64,
            "content_sha1": sha1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let committed = upload_single(&client, &update_for("notes/todo.txt"), data.into())
        .await
        .expect("upload failed");

    assert_eq!(committed.item_id.as_str(), "item-1");
    assert_eq!(committed.size, 64);
    assert_eq!(committed.hash.unwrap().to_hex(), sha1);
}

#[tokio::test]
async fn test_upload_single_detects_size_disagreement() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("PUT"))
        .and(path("/files/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "item_id": "item-1",
            "size": 3
        })))
        .mount(&server)
        .await;

    let err = upload_single(&client, &update_for("a.txt"), pattern(4).into())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncFault::SizeMismatch { declared: 4, actual: 3 }));
}

#[tokio::test]
async fn test_buffered_upload_commits_in_one_request() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("PUT"))
        .and(path("/files/b.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "item_id": "item-2",
            "size": 10
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut stream: Box<dyn IWriteStream> =
        Box::new(BufferedUpload::new(client, update_for("b.txt"), 10));
    stream.write(b"hello").await.unwrap();
    stream.write(b"world").await.unwrap();

    let err = stream.write(b"!").await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::ContractViolation);

    let committed = stream.commit().await.unwrap();
    assert_eq!(committed.item_id.as_str(), "item-2");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].body, b"helloworld");
}

#[tokio::test]
async fn test_buffered_upload_short_commit_sends_nothing() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut stream: Box<dyn IWriteStream> =
        Box::new(BufferedUpload::new(client, update_for("c.txt"), 10));
    stream.write(b"abc").await.unwrap();
    let err = stream.commit().await.unwrap_err();
    assert!(matches!(err, SyncFault::SizeMismatch { declared: 10, actual: 3 }));
}
