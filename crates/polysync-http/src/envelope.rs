//! Resilient request envelope
//!
//! ```text
//!   send ──2xx──► Ok(response)
//!     │
//!     ├─ auth expired ──► refresh once ──► replay ──2xx──► Ok(response)
//!     │                                      │
//!     │                                      ├─ auth expired ──► AuthenticationFailed
//!     │                                      └─ other failure ──► Remote
//!     └─ other failure ──► Remote
//! ```
//!
//! At most one refresh-and-replay happens per call. The replay reuses the
//! same buffered request; only the authorization header changes.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use polysync_core::domain::{RemoteFault, SyncFault};
use reqwest::header::HeaderValue;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{fault_from_response, transport_fault};
use crate::redact::{redact_headers, redact_url};
use crate::request::ReplayableRequest;

// ============================================================================
// Credentials
// ============================================================================

/// How a token is presented in the `Authorization` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `Authorization: <token>`
    Raw,
}

/// Credentials attached to outbound requests
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
    scheme: AuthScheme,
}

impl Credentials {
    /// Bearer token credentials
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            scheme: AuthScheme::Bearer,
        }
    }

    /// Credentials sent verbatim as the header value
    pub fn raw(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            scheme: AuthScheme::Raw,
        }
    }

    /// Presentation scheme
    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// The token itself
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Builds the `Authorization` header value, marked sensitive
    ///
    /// # Errors
    /// Returns a contract violation if the token contains characters not
    /// allowed in a header
    pub fn header_value(&self) -> Result<HeaderValue, SyncFault> {
        let text = match self.scheme {
            AuthScheme::Bearer => format!("Bearer {}", self.token),
            AuthScheme::Raw => self.token.clone(),
        };
        let mut value = HeaderValue::from_str(&text)
            .map_err(|_| SyncFault::contract("credential token is not a valid header value"))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &crate::redact::REDACTED)
            .field("scheme", &self.scheme)
            .finish()
    }
}

/// Source of fresh credentials after the backend rejected the current ones
#[async_trait]
pub trait ICredentialRefresher: Send + Sync {
    /// Obtains new credentials
    async fn refresh(&self) -> Result<Credentials, SyncFault>;
}

// ============================================================================
// AuthExpiryPolicy
// ============================================================================

/// Decides which failures mean "credentials expired"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthExpiryPolicy {
    statuses: Vec<u16>,
    codes: Vec<String>,
}

impl AuthExpiryPolicy {
    /// Policy matching the given statuses or provider codes
    pub fn new(statuses: Vec<u16>, codes: Vec<String>) -> Self {
        Self { statuses, codes }
    }

    /// True if `fault` signals expired or invalid credentials
    pub fn is_expired(&self, fault: &RemoteFault) -> bool {
        self.statuses.contains(&fault.status)
            || fault
                .code
                .as_deref()
                .is_some_and(|code| self.codes.iter().any(|known| known == code))
    }
}

impl Default for AuthExpiryPolicy {
    fn default() -> Self {
        Self {
            statuses: vec![401],
            codes: vec![
                "expired_auth_token".to_string(),
                "bad_auth_token".to_string(),
                "InvalidAuthenticationToken".to_string(),
            ],
        }
    }
}

// ============================================================================
// RequestEnvelope
// ============================================================================

struct CredentialSlot {
    credentials: Credentials,
    generation: u64,
}

/// Uniform wrapper around every outbound call of a networked adapter
pub struct RequestEnvelope {
    client: Client,
    slot: RwLock<CredentialSlot>,
    refresher: Option<Arc<dyn ICredentialRefresher>>,
    policy: AuthExpiryPolicy,
    refreshes: AtomicU32,
}

impl RequestEnvelope {
    /// Creates an envelope with fixed credentials and no refresher
    pub fn new(client: Client, credentials: Credentials) -> Self {
        Self {
            client,
            slot: RwLock::new(CredentialSlot {
                credentials,
                generation: 0,
            }),
            refresher: None,
            policy: AuthExpiryPolicy::default(),
            refreshes: AtomicU32::new(0),
        }
    }

    /// Sets the credential refresher
    pub fn with_refresher(mut self, refresher: Arc<dyn ICredentialRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Replaces the expiry policy
    pub fn with_policy(mut self, policy: AuthExpiryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The underlying HTTP client
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Current credentials
    pub async fn credentials(&self) -> Credentials {
        self.slot.read().await.credentials.clone()
    }

    /// Replaces the credentials (e.g., after an out-of-band login)
    pub async fn set_credentials(&self, credentials: Credentials) {
        let mut slot = self.slot.write().await;
        slot.credentials = credentials;
        slot.generation += 1;
        debug!("Updated envelope credentials");
    }

    /// Number of credential refreshes performed so far
    pub fn refresh_count(&self) -> u32 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Sends `request`, refreshing credentials at most once
    ///
    /// # Errors
    /// - `AuthenticationFailed` if the credentials are still rejected after a
    ///   refresh, or are rejected and no refresher is configured
    /// - `Remote` for any other failure status
    /// - `Transport` if no response was received
    pub async fn send(&self, request: &ReplayableRequest) -> Result<Response, SyncFault> {
        let (credentials, generation) = {
            let slot = self.slot.read().await;
            (slot.credentials.clone(), slot.generation)
        };

        let response = self.attempt(request, &credentials).await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let fault = fault_from_response(response).await;
        if !request.is_authenticated() || !self.policy.is_expired(&fault) {
            debug!(status = fault.status, code = fault.code_str(), "Request failed");
            return Err(SyncFault::Remote(fault));
        }

        let Some(refresher) = &self.refresher else {
            warn!(status = fault.status, "Credentials rejected and no refresher configured");
            return Err(SyncFault::AuthenticationFailed(fault));
        };

        info!(
            status = fault.status,
            code = fault.code_str(),
            "Credentials expired, refreshing"
        );
        let credentials = {
            let mut slot = self.slot.write().await;
            if slot.generation == generation {
                slot.credentials = refresher.refresh().await?;
                slot.generation += 1;
                self.refreshes.fetch_add(1, Ordering::Relaxed);
            }
            slot.credentials.clone()
        };

        let response = self.attempt(request, &credentials).await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let fault = fault_from_response(response).await;
        if self.policy.is_expired(&fault) {
            warn!(
                status = fault.status,
                code = fault.code_str(),
                "Credentials rejected again after refresh"
            );
            return Err(SyncFault::AuthenticationFailed(fault));
        }
        debug!(status = fault.status, code = fault.code_str(), "Replayed request failed");
        Err(SyncFault::Remote(fault))
    }

    /// Sends `request` and decodes a JSON response body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: &ReplayableRequest,
    ) -> Result<T, SyncFault> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(transport_fault)
    }

    async fn attempt(
        &self,
        request: &ReplayableRequest,
        credentials: &Credentials,
    ) -> Result<Response, SyncFault> {
        let authorization = if request.is_authenticated() {
            Some(credentials.header_value()?)
        } else {
            None
        };
        let builder = request.to_builder(&self.client, authorization);
        let built = builder.build().map_err(transport_fault)?;

        debug!(
            method = %built.method(),
            url = redact_url(built.url().as_str()),
            headers = ?redact_headers(built.headers()),
            body_len = request.body_bytes().len(),
            "Sending request"
        );

        self.client.execute(built).await.map_err(transport_fault)
    }
}

impl fmt::Debug for RequestEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEnvelope")
            .field("has_refresher", &self.refresher.is_some())
            .field("policy", &self.policy)
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}
