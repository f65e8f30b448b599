//! Integration tests for ranged fragment downloads

use polysync_core::domain::{FaultKind, SyncFault};
use polysync_core::ports::IReadStream;
use polysync_http::download::HttpFragmentSource;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, pattern, RangeResponder};

async fn read_to_end<R: IReadStream>(reader: &mut R, buf_size: usize) -> Result<Vec<u8>, SyncFault> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; buf_size];
    loop {
        let n = reader.read(&mut buf).await?;
        out.extend_from_slice(&buf[..n]);
        if n < buf_size {
            return Ok(out);
        }
    }
}

#[tokio::test]
async fn test_fragments_requested_by_range() {
    let (server, client) = common::setup_mock().await;
    let data = pattern(1000);

    Mock::given(method("GET"))
        .and(path("/files/video.mp4"))
        .respond_with(RangeResponder { data: data.clone() })
        .expect(4)
        .mount(&server)
        .await;

    let mut reader = HttpFragmentSource::new(client, "/files/video.mp4").into_reader(256, None);
    let got = read_to_end(&mut reader, 100).await.expect("download failed");

    assert_eq!(got, data);
    assert_eq!(reader.requests(), 4);
    assert_eq!(reader.total_length(), Some(1000));

    let ranges: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.headers.get("range").unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(
        ranges,
        vec!["bytes=0-255", "bytes=256-511", "bytes=512-767", "bytes=768-999"]
    );
}

#[tokio::test]
async fn test_aligned_object_of_unknown_size() {
    let (server, client) = common::setup_mock().await;
    let data = pattern(512);

    Mock::given(method("GET"))
        .and(path("/files/aligned.bin"))
        .respond_with(RangeResponder { data: data.clone() })
        .mount(&server)
        .await;

    let mut reader = HttpFragmentSource::new(client, "/files/aligned.bin").into_reader(256, None);
    let got = read_to_end(&mut reader, 64).await.unwrap();

    assert_eq!(got, data);
    assert_eq!(reader.requests(), 2);
}

#[tokio::test]
async fn test_server_ignoring_range_is_sliced() {
    let (server, client) = common::setup_mock().await;
    let data = pattern(300);

    Mock::given(method("GET"))
        .and(path("/files/plain.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
        .mount(&server)
        .await;

    let mut reader = HttpFragmentSource::new(client, "/files/plain.txt").into_reader(128, None);
    let got = read_to_end(&mut reader, 50).await.unwrap();

    assert_eq!(got, data);
    assert_eq!(reader.requests(), 3);
}

#[tokio::test]
async fn test_declared_length_disagreeing_with_backend() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("GET"))
        .and(path("/files/changed.bin"))
        .respond_with(RangeResponder { data: pattern(100) })
        .mount(&server)
        .await;

    let mut reader =
        HttpFragmentSource::new(client, "/files/changed.bin").into_reader(64, Some(120));
    let err = read_to_end(&mut reader, 32).await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::Integrity);
}

#[tokio::test]
async fn test_missing_object() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("GET"))
        .and(path("/files/gone.bin"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "status": 404, "code": "not_found", "message": "File not present"
        })))
        .mount(&server)
        .await;

    let mut reader = HttpFragmentSource::new(client, "/files/gone.bin").into_reader(64, None);
    let err = read_to_end(&mut reader, 32).await.unwrap_err();
    assert_eq!(err.kind(), FaultKind::Remote);
    assert_eq!(err.remote().unwrap().code.as_deref(), Some("not_found"));
}
