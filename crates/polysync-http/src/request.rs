//! Replayable requests
//!
//! A [`ReplayableRequest`] owns everything needed to send the same request
//! more than once: method, absolute URL, headers and a fully buffered body.
//! The body is a [`Bytes`] so each replay is a reference-count bump, never a
//! copy. Authorization is not part of the request; the envelope adds it per
//! attempt.

use bytes::Bytes;
use polysync_core::domain::SyncFault;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;

/// Buffered description of one outbound request
#[derive(Debug, Clone)]
pub struct ReplayableRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Bytes,
    authenticated: bool,
}

impl ReplayableRequest {
    /// Creates a request with an empty body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            authenticated: true,
        }
    }

    /// Adds a header
    ///
    /// `Authorization` is ignored here; credentials are attached by the envelope.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if name != AUTHORIZATION {
            self.headers.insert(name, value);
        }
        self
    }

    /// Adds a header from strings
    ///
    /// # Errors
    /// Returns a contract violation if the name or value is not a valid header
    pub fn header_str(self, name: &str, value: &str) -> Result<Self, SyncFault> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SyncFault::contract(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SyncFault::contract(format!("invalid value for header {name}: {e}")))?;
        Ok(self.header(name, value))
    }

    /// Sets a raw body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serializes `value` as the JSON body
    ///
    /// # Errors
    /// Returns a contract violation if `value` cannot be serialized
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, SyncFault> {
        let body = serde_json::to_vec(value)
            .map_err(|e| SyncFault::contract(format!("request body is not serializable: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Bytes::from(body);
        Ok(self)
    }

    /// Sends the request without any credentials
    ///
    /// Used for pre-signed URLs that carry their own authorization.
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Headers, without authorization
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Buffered body
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Whether the envelope should attach credentials
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Builds one attempt of this request
    ///
    /// Every call yields an identical request apart from the authorization
    /// header passed in.
    pub(crate) fn to_builder(
        &self,
        client: &Client,
        authorization: Option<HeaderValue>,
    ) -> RequestBuilder {
        let mut headers = self.headers.clone();
        if let Some(value) = authorization {
            headers.insert(AUTHORIZATION, value);
        }
        client
            .request(self.method.clone(), &self.url)
            .headers(headers)
            .body(self.body.clone())
    }
}
