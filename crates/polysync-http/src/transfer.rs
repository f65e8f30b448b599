//! Transfer handles sized by the `transfer` configuration section
//!
//! Uploads below `multipart_threshold_bytes` are buffered and sent in one
//! request; larger ones go through a multipart session with parts of
//! `part_size_bytes`. Downloads read `fragment_size_bytes` per request.

use std::sync::Arc;

use polysync_core::config::TransferConfig;
use polysync_core::domain::{EntryUpdateInfo, RelativePath, SyncFault};
use polysync_core::ports::IWriteStream;
use polysync_transfer::FragmentReader;
use tracing::debug;

use crate::client::ApiClient;
use crate::download::HttpFragmentSource;
use crate::multipart::HttpMultipartBackend;
use crate::upload::BufferedUpload;

/// Opens read and write handles for objects under `/files`
#[derive(Debug, Clone)]
pub struct TransferFactory {
    client: ApiClient,
    multipart: Arc<HttpMultipartBackend>,
    part_size: usize,
    fragment_size: u64,
    multipart_threshold: u64,
}

impl TransferFactory {
    /// # Errors
    /// Rejects zero sizes and a part size that does not fit in memory
    pub fn new(client: ApiClient, config: &TransferConfig) -> Result<Self, SyncFault> {
        if config.part_size_bytes == 0 || config.fragment_size_bytes == 0 {
            return Err(SyncFault::contract(
                "part and fragment sizes must be greater than 0",
            ));
        }
        let part_size = usize::try_from(config.part_size_bytes).map_err(|_| {
            SyncFault::contract(format!(
                "part size {} does not fit in memory",
                config.part_size_bytes
            ))
        })?;
        Ok(Self {
            multipart: Arc::new(HttpMultipartBackend::new(client.clone())),
            client,
            part_size,
            fragment_size: config.fragment_size_bytes,
            multipart_threshold: config.multipart_threshold_bytes,
        })
    }

    /// Whether an object of `length` bytes is uploaded in parts
    pub fn uses_multipart(&self, length: u64) -> bool {
        length >= self.multipart_threshold
    }

    /// Opens a write handle for exactly `expected_length` bytes
    pub async fn open_write(
        &self,
        update: &EntryUpdateInfo,
        expected_length: u64,
    ) -> Result<Box<dyn IWriteStream>, SyncFault> {
        if self.uses_multipart(expected_length) {
            debug!(path = %update.relative_path, expected_length, "Opening multipart upload");
            let upload = self
                .multipart
                .open(update, expected_length, self.part_size)
                .await?;
            Ok(Box::new(upload))
        } else {
            debug!(path = %update.relative_path, expected_length, "Opening single-shot upload");
            Ok(Box::new(BufferedUpload::new(
                self.client.clone(),
                update.clone(),
                expected_length,
            )))
        }
    }

    /// Opens a forward-only reader for the object at `path`
    pub fn open_read(
        &self,
        path: &RelativePath,
        expected_length: Option<u64>,
    ) -> FragmentReader<HttpFragmentSource> {
        HttpFragmentSource::new(self.client.clone(), &format!("/files/{}", path.as_str()))
            .into_reader(self.fragment_size, expected_length)
    }
}
