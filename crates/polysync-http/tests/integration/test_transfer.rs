//! Integration tests for config-driven handle selection

use polysync_core::config::TransferConfig;
use polysync_core::domain::RelativePath;
use polysync_core::ports::{IReadStream, IWriteStream};
use polysync_http::TransferFactory;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, pattern, update_for, PartEchoResponder, RangeResponder};

fn transfer_config() -> TransferConfig {
    TransferConfig {
        part_size_bytes: 10,
        fragment_size_bytes: 16,
        multipart_threshold_bytes: 20,
    }
}

async fn mount_multipart(server: &MockServer, expected_sessions: u64) {
    Mock::given(method("POST"))
        .and(path("/uploads/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"file_id": "f-1"})))
        .expect(expected_sessions)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/uploads/f-1/part-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "upload_url": format!("{}/upload/f-1", server.uri())
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload/f-1"))
        .respond_with(PartEchoResponder { corrupt: false })
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/uploads/f-1/finish"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "item_id": "item-big",
            "size": 20
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_small_object_uses_single_request() {
    let (server, client) = common::setup_mock().await;
    mount_multipart(&server, 0).await;

    Mock::given(method("PUT"))
        .and(path("/files/small.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "item_id": "item-small",
            "size": 19
        })))
        .expect(1)
        .mount(&server)
        .await;

    let factory = TransferFactory::new(client, &transfer_config()).unwrap();
    let mut stream = factory
        .open_write(&update_for("small.txt"), 19)
        .await
        .expect("open failed");
    stream.write(&pattern(19)).await.unwrap();

    let committed = stream.commit().await.expect("commit failed");
    assert_eq!(committed.item_id.as_str(), "item-small");
}

#[tokio::test]
async fn test_object_at_threshold_uses_multipart_parts() {
    let (server, client) = common::setup_mock().await;
    mount_multipart(&server, 1).await;

    Mock::given(method("PUT"))
        .and(path("/files/big.bin"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let factory = TransferFactory::new(client, &transfer_config()).unwrap();
    let mut stream = factory
        .open_write(&update_for("big.bin"), 20)
        .await
        .expect("open failed");
    stream.write(&pattern(20)).await.unwrap();

    let committed = stream.commit().await.expect("commit failed");
    assert_eq!(committed.item_id.as_str(), "item-big");

    let part_sizes: Vec<usize> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/upload/f-1")
        .map(|r| r.body.len())
        .collect();
    assert_eq!(part_sizes, vec![10, 10]);
}

#[tokio::test]
async fn test_reads_use_configured_fragment_size() {
    let (server, client) = common::setup_mock().await;
    let data = pattern(40);

    Mock::given(method("GET"))
        .and(path("/files/docs/a.bin"))
        .respond_with(RangeResponder { data: data.clone() })
        .expect(3)
        .mount(&server)
        .await;

    let factory = TransferFactory::new(client, &transfer_config()).unwrap();
    let mut reader = factory.open_read(&RelativePath::new("docs/a.bin").unwrap(), Some(40));

    let mut got = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = reader.read(&mut buf).await.expect("read failed");
        got.extend_from_slice(&buf[..n]);
        if n < buf.len() {
            break;
        }
    }
    assert_eq!(got, data);
    assert_eq!(reader.requests(), 3);

    let ranges: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.headers.get("range").unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(ranges, vec!["bytes=0-15", "bytes=16-31", "bytes=32-39"]);
}
