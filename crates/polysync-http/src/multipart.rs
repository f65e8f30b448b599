//! JSON multipart upload binding
//!
//! Implements [`MultipartBackend`] against a small JSON protocol:
//!
//! | Step | Request | Response |
//! |------|---------|----------|
//! | start | `POST /uploads/start` `{"path", "size"}` | `{"file_id"}` |
//! | part target | `POST /uploads/{file_id}/part-url` | `{"upload_url"}` |
//! | part | `POST {upload_url}` with `X-Part-Number`, `X-Content-Sha1` | `{"part_number", "content_sha1", "content_length"}` |
//! | finish | `POST /uploads/{file_id}/finish` `{"part_sha1_array"}` | `{"item_id", "size"}` |
//! | cancel | `POST /uploads/{file_id}/cancel` | any 2xx |
//!
//! Every call goes through the client's envelope. The SHA-1 echoed for each
//! part is compared with the locally computed one.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use polysync_core::domain::{ContentHash, EntryUpdateInfo, ItemId, SyncFault};
use polysync_transfer::{MultipartBackend, MultipartUpload, UploadTarget};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ApiClient;

/// Header carrying the 1-based part number
pub const PART_NUMBER_HEADER: &str = "x-part-number";
/// Header carrying the hex SHA-1 of the part
pub const CONTENT_SHA1_HEADER: &str = "x-content-sha1";

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    path: &'a str,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct PartUrlResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    part_number: u32,
    content_sha1: String,
    #[serde(default)]
    content_length: Option<u64>,
}

#[derive(Debug, Serialize)]
struct FinishRequest {
    part_sha1_array: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FinishResponse {
    item_id: String,
}

/// Multipart backend speaking the JSON upload protocol
#[derive(Debug, Clone)]
pub struct HttpMultipartBackend {
    client: ApiClient,
}

impl HttpMultipartBackend {
    /// Creates a backend over `client`
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// The API client
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Opens a write handle for `update` backed by a new upload session
    pub async fn open(
        self: &Arc<Self>,
        update: &EntryUpdateInfo,
        total_length: u64,
        part_size: usize,
    ) -> Result<MultipartUpload<Self>, SyncFault> {
        MultipartUpload::start(Arc::clone(self), update, total_length, part_size).await
    }
}

fn header(name: &'static str, value: &str) -> Result<(HeaderName, HeaderValue), SyncFault> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| SyncFault::contract(format!("invalid value for header {name}")))?;
    Ok((HeaderName::from_static(name), value))
}

#[async_trait]
impl MultipartBackend for HttpMultipartBackend {
    async fn start_upload(
        &self,
        update: &EntryUpdateInfo,
        total_length: u64,
    ) -> Result<String, SyncFault> {
        let request = self.client.request(Method::POST, "/uploads/start").json(&StartRequest {
            path: update.relative_path.as_str(),
            size: total_length,
        })?;
        let response: StartResponse = self.client.send_json(&request).await?;
        debug!(path = %update.relative_path, file_id = %response.file_id, "Upload started");
        Ok(response.file_id)
    }

    async fn get_part_target(&self, file_id: &str) -> Result<UploadTarget, SyncFault> {
        let request = self
            .client
            .request(Method::POST, &format!("/uploads/{file_id}/part-url"));
        let response: PartUrlResponse = self.client.send_json(&request).await?;
        Ok(UploadTarget {
            upload_url: response.upload_url,
        })
    }

    async fn upload_part(
        &self,
        target: &UploadTarget,
        part_number: u32,
        data: Bytes,
        hash: &ContentHash,
    ) -> Result<(), SyncFault> {
        let len = data.len() as u64;
        let expected = hash.to_hex();
        let (number_name, number_value) = header(PART_NUMBER_HEADER, &part_number.to_string())?;
        let (sha_name, sha_value) = header(CONTENT_SHA1_HEADER, &expected)?;

        let request = self
            .client
            .request(Method::POST, &target.upload_url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
            .header(number_name, number_value)
            .header(sha_name, sha_value)
            .body(data);
        let response: PartResponse = self.client.send_json(&request).await?;

        if response.part_number != part_number {
            return Err(SyncFault::IntegrityMismatch {
                part_number,
                message: format!("backend acknowledged part {}", response.part_number),
            });
        }
        if !response.content_sha1.eq_ignore_ascii_case(&expected) {
            return Err(SyncFault::IntegrityMismatch {
                part_number,
                message: format!(
                    "sha1 {} does not match local {}",
                    response.content_sha1, expected
                ),
            });
        }
        if let Some(acknowledged) = response.content_length {
            if acknowledged != len {
                return Err(SyncFault::SizeMismatch {
                    declared: len,
                    actual: acknowledged,
                });
            }
        }
        Ok(())
    }

    async fn finish_upload(
        &self,
        file_id: &str,
        part_hashes: &[ContentHash],
    ) -> Result<ItemId, SyncFault> {
        let request = self
            .client
            .request(Method::POST, &format!("/uploads/{file_id}/finish"))
            .json(&FinishRequest {
                part_sha1_array: part_hashes.iter().map(ContentHash::to_hex).collect(),
            })?;
        let response: FinishResponse = self.client.send_json(&request).await?;
        ItemId::new(response.item_id).map_err(|e| {
            SyncFault::Transport(format!("finish response carried an invalid item id: {e}"))
        })
    }

    async fn cancel_upload(&self, file_id: &str) -> Result<(), SyncFault> {
        let request = self
            .client
            .request(Method::POST, &format!("/uploads/{file_id}/cancel"));
        self.client.send(&request).await?;
        debug!(file_id, "Upload cancelled");
        Ok(())
    }
}
