//! Single-shot uploads
//!
//! Objects below the multipart threshold are sent in one request:
//! `PUT /files/{path}` with the whole body and its SHA-1 in
//! `X-Content-Sha1`. The backend answers `{"item_id", "size", "content_sha1"}`.
//!
//! [`BufferedUpload`] is the matching write handle: it collects the bytes
//! in memory and sends them on commit.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use polysync_core::domain::{EntryUpdateInfo, HashKind, ItemId, SyncFault};
use polysync_core::ports::{CommittedItem, IWriteStream};
use polysync_transfer::compute_hash;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::multipart::CONTENT_SHA1_HEADER;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    item_id: String,
    size: u64,
    #[serde(default)]
    content_sha1: Option<String>,
}

/// Uploads `data` as the content of `update`'s path in a single request
///
/// # Errors
/// Returns an integrity fault if the backend reports a different size or
/// hash than was sent
pub async fn upload_single(
    client: &ApiClient,
    update: &EntryUpdateInfo,
    data: Bytes,
) -> Result<CommittedItem, SyncFault> {
    let hash = compute_hash(HashKind::Sha1, &data);
    let len = data.len() as u64;
    let sha_value = HeaderValue::from_str(&hash.to_hex())
        .map_err(|_| SyncFault::contract("invalid sha1 header value"))?;
    debug!(path = %update.relative_path, len, "Uploading object in one request");

    let request = client
        .request(Method::PUT, &format!("/files/{}", update.relative_path.as_str()))
        .header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
        .header(HeaderName::from_static(CONTENT_SHA1_HEADER), sha_value)
        .body(data);
    let response: UploadResponse = client.send_json(&request).await?;

    if response.size != len {
        return Err(SyncFault::SizeMismatch {
            declared: len,
            actual: response.size,
        });
    }
    if let Some(echoed) = &response.content_sha1 {
        if !echoed.eq_ignore_ascii_case(&hash.to_hex()) {
            return Err(SyncFault::IntegrityMismatch {
                part_number: 0,
                message: format!("sha1 {echoed} does not match local {hash}"),
            });
        }
    }

    let item_id = ItemId::new(response.item_id).map_err(|e| {
        SyncFault::Transport(format!("upload response carried an invalid item id: {e}"))
    })?;
    info!(path = %update.relative_path, item_id = %item_id, len, "Upload completed");
    Ok(CommittedItem {
        item_id,
        size: len,
        hash: Some(hash),
    })
}

/// Write handle that buffers the whole object and uploads it on commit
pub struct BufferedUpload {
    client: ApiClient,
    update: EntryUpdateInfo,
    expected_length: u64,
    buffer: BytesMut,
}

impl BufferedUpload {
    /// Creates a handle for exactly `expected_length` bytes
    pub fn new(client: ApiClient, update: EntryUpdateInfo, expected_length: u64) -> Self {
        let capacity = usize::try_from(expected_length).unwrap_or(0);
        Self {
            client,
            update,
            expected_length,
            buffer: BytesMut::with_capacity(capacity),
        }
    }
}

#[async_trait]
impl IWriteStream for BufferedUpload {
    async fn write(&mut self, data: &[u8]) -> Result<(), SyncFault> {
        let written = self.buffer.len() as u64;
        if written + data.len() as u64 > self.expected_length {
            return Err(SyncFault::contract(format!(
                "write of {} bytes exceeds the declared length ({} of {} bytes already written)",
                data.len(),
                written,
                self.expected_length
            )));
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SyncFault> {
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn expected_length(&self) -> u64 {
        self.expected_length
    }

    async fn commit(self: Box<Self>) -> Result<CommittedItem, SyncFault> {
        let actual = self.buffer.len() as u64;
        if actual != self.expected_length {
            return Err(SyncFault::SizeMismatch {
                declared: self.expected_length,
                actual,
            });
        }
        let BufferedUpload {
            client,
            update,
            buffer,
            ..
        } = *self;
        upload_single(&client, &update, buffer.freeze()).await
    }

    async fn abort(self: Box<Self>) -> Result<(), SyncFault> {
        debug!(path = %self.update.relative_path, "Discarding buffered upload");
        Ok(())
    }
}
