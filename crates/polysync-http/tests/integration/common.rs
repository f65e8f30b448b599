//! Shared test helpers for polysync-http integration tests
//!
//! Provides wiremock-based mock server setup, a counting credential
//! refresher, and responders that inspect the request (ranges, part hashes).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use polysync_core::domain::{
    ChangeFlags, EntryType, EntryUpdateInfo, HashKind, RelativePath, SyncEntry, SyncFault,
};
use polysync_http::{ApiClient, Credentials, ICredentialRefresher, RequestEnvelope};
use polysync_transfer::compute_hash;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

/// Token the clients start with
pub const STALE_TOKEN: &str = "stale-token";
/// Token handed out by [`CountingRefresher`]
pub const FRESH_TOKEN: &str = "fresh-token";

/// Refresher that hands out a fixed token and counts calls
#[derive(Debug)]
pub struct CountingRefresher {
    token: String,
    calls: AtomicU32,
}

impl CountingRefresher {
    pub fn new(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: token.to_string(),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ICredentialRefresher for CountingRefresher {
    async fn refresh(&self) -> Result<Credentials, SyncFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Credentials::bearer(self.token.clone()))
    }
}

/// Starts a mock server and returns a client without refresher
pub async fn setup_mock() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let client = ApiClient::with_base_url(STALE_TOKEN, server.uri());
    (server, client)
}

/// Starts a mock server and returns a client whose envelope refreshes to
/// [`FRESH_TOKEN`]
pub async fn setup_mock_with_refresher() -> (MockServer, ApiClient, Arc<CountingRefresher>) {
    let server = MockServer::start().await;
    let refresher = CountingRefresher::new(FRESH_TOKEN);
    let envelope = RequestEnvelope::new(reqwest::Client::new(), Credentials::bearer(STALE_TOKEN))
        .with_refresher(refresher.clone());
    let client = ApiClient::new(Arc::new(envelope), server.uri());
    (server, client, refresher)
}

/// `Authorization` value for a bearer token
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Change record for a new file at `path`
pub fn update_for(path: &str) -> EntryUpdateInfo {
    let root = SyncEntry::new_root();
    let relative_path = RelativePath::new(path).unwrap();
    let name = relative_path.file_name().unwrap().to_string();
    let entry = SyncEntry::new_child(root.id(), name, EntryType::File).unwrap();
    EntryUpdateInfo::new(entry, relative_path, ChangeFlags::NEW_FILE)
}

/// Deterministic test payload
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Serves `Range` requests out of an in-memory object
pub struct RangeResponder {
    pub data: Vec<u8>,
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let total = self.data.len() as u64;
        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.split_once('-'))
            .and_then(|(a, b)| Some((a.parse::<u64>().ok()?, b.parse::<u64>().ok()?)));

        let Some((start, end)) = range else {
            return ResponseTemplate::new(200).set_body_bytes(self.data.clone());
        };
        if start >= total {
            return ResponseTemplate::new(416)
                .insert_header("Content-Range", format!("bytes */{total}").as_str());
        }
        let end = end.min(total - 1);
        ResponseTemplate::new(206)
            .insert_header(
                "Content-Range",
                format!("bytes {start}-{end}/{total}").as_str(),
            )
            .set_body_bytes(self.data[start as usize..=end as usize].to_vec())
    }
}

/// Acknowledges part uploads, echoing the SHA-1 of the received body
pub struct PartEchoResponder {
    pub corrupt: bool,
}

impl Respond for PartEchoResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let part_number: u32 = request
            .headers
            .get("x-part-number")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let sha1 = if self.corrupt {
            "0000000000000000000000000000000000000000".to_string()
        } else {
            compute_hash(HashKind::Sha1, &request.body).to_hex()
        };
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "part_number": part_number,
            "content_sha1": sha1,
            "content_length": request.body.len(),
        }))
    }
}
