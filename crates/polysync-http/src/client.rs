//! API client
//!
//! [`ApiClient`] pairs a base URL with a shared [`RequestEnvelope`]. The
//! bindings in this crate build [`ReplayableRequest`]s through it so every
//! call gets the same credential handling and error translation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use polysync_http::client::ApiClient;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), polysync_core::domain::SyncFault> {
//! let client = ApiClient::with_base_url("access-token", "https://api.example.com/v1");
//! let request = client.request(Method::GET, "/files/root");
//! let listing: serde_json::Value = client.send_json(&request).await?;
//! println!("{listing}");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use polysync_core::config::HttpConfig;
use polysync_core::domain::SyncFault;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::envelope::{Credentials, RequestEnvelope};
use crate::error::transport_fault;
use crate::request::ReplayableRequest;

/// Builds the shared `reqwest` client from the HTTP configuration section
///
/// # Errors
/// Returns a transport fault if the TLS backend cannot be initialised
pub fn build_http_client(config: &HttpConfig) -> Result<Client, SyncFault> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(transport_fault)
}

/// HTTP client for one backend account
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// Base URL for relative API paths
    base_url: String,
    /// Shared envelope (credentials, refresher, expiry policy)
    envelope: Arc<RequestEnvelope>,
}

impl ApiClient {
    /// Creates a client over an existing envelope
    pub fn new(envelope: Arc<RequestEnvelope>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "Created API client");
        Self { base_url, envelope }
    }

    /// Creates a client with a bearer token and a custom base URL (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let envelope = RequestEnvelope::new(Client::new(), Credentials::bearer(access_token));
        Self::new(Arc::new(envelope), base_url)
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The shared envelope
    pub fn envelope(&self) -> &Arc<RequestEnvelope> {
        &self.envelope
    }

    /// Resolves `path` against the base URL; absolute URLs pass through
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Starts a request for the given method and path
    pub fn request(&self, method: Method, path: &str) -> ReplayableRequest {
        ReplayableRequest::new(method, self.url(path))
    }

    /// Sends a request through the envelope
    pub async fn send(&self, request: &ReplayableRequest) -> Result<Response, SyncFault> {
        self.envelope.send(request).await
    }

    /// Sends a request and decodes its JSON response
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: &ReplayableRequest,
    ) -> Result<T, SyncFault> {
        self.envelope.send_json(request).await
    }
}
