//! Ranged downloads
//!
//! [`HttpFragmentSource`] serves fragments with `Range: bytes=a-b` requests
//! and learns the object size from `Content-Range`. Servers that ignore the
//! range and answer `200` with the whole body are handled by slicing.

use async_trait::async_trait;
use bytes::Bytes;
use polysync_core::domain::SyncFault;
use polysync_transfer::{Fragment, FragmentReader, FragmentSource};
use reqwest::header::{HeaderValue, CONTENT_RANGE, RANGE};
use reqwest::{Method, StatusCode};
use tracing::debug;

use crate::client::ApiClient;
use crate::error::{fault_from_response, transport_fault};

/// Fragment source reading one object by URL
#[derive(Debug, Clone)]
pub struct HttpFragmentSource {
    client: ApiClient,
    url: String,
}

impl HttpFragmentSource {
    /// Creates a source for the object at `path` (relative to the client's
    /// base URL, or absolute)
    pub fn new(client: ApiClient, path: &str) -> Self {
        let url = client.url(path);
        Self { client, url }
    }

    /// Wraps this source into a forward-only reader
    pub fn into_reader(
        self,
        fragment_size: u64,
        expected_length: Option<u64>,
    ) -> FragmentReader<Self> {
        FragmentReader::new(self, fragment_size, expected_length)
    }
}

/// Parses the total length out of a `Content-Range` value
///
/// Accepts `bytes 0-99/1234` and `bytes */1234`; an unknown total (`/*`)
/// yields `None`.
pub fn content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}

#[async_trait]
impl FragmentSource for HttpFragmentSource {
    async fn fetch(&mut self, offset: u64, length: u64) -> Result<Fragment, SyncFault> {
        if length == 0 {
            return Ok(Fragment {
                data: Bytes::new(),
                total_length: None,
            });
        }
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        let range = HeaderValue::from_str(&range)
            .map_err(|_| SyncFault::contract("invalid range header"))?;
        let request = self
            .client
            .request(Method::GET, &self.url)
            .header(RANGE, range);

        let response = match self.client.send(&request).await {
            Ok(response) => response,
            Err(SyncFault::Remote(fault)) if fault.status == 416 => {
                // Reading at the exact end of an object of unknown size.
                debug!(offset, "Range not satisfiable, treating as end of object");
                return Ok(Fragment {
                    data: Bytes::new(),
                    total_length: Some(offset),
                });
            }
            Err(fault) => return Err(fault),
        };

        let status = response.status();
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total);

        match status {
            StatusCode::PARTIAL_CONTENT => {
                let data = response.bytes().await.map_err(transport_fault)?;
                Ok(Fragment {
                    data,
                    total_length: total,
                })
            }
            status if status.is_success() => {
                let body = response.bytes().await.map_err(transport_fault)?;
                let whole = body.len() as u64;
                let start = offset.min(whole) as usize;
                let end = (offset + length).min(whole) as usize;
                debug!(offset, whole, "Server ignored range, slicing full body");
                Ok(Fragment {
                    data: body.slice(start..end),
                    total_length: Some(whole),
                })
            }
            _ => Err(SyncFault::Remote(fault_from_response(response).await)),
        }
    }
}
