//! Account authorization
//!
//! Networked adapters authenticate with a long-lived account key (key id +
//! secret) and exchange it for a short-lived session token:
//!
//! - [`AccountAuthorizer`] - calls the authorize endpoint with HTTP Basic
//!   auth; doubles as the envelope's [`ICredentialRefresher`]
//! - [`KeyringCredentialStore`] - keeps account keys in the OS keyring,
//!   keyed by adapter id, so they never land in the configuration file

use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use polysync_core::domain::{AdapterId, SyncFault};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::envelope::{AuthScheme, Credentials, ICredentialRefresher};
use crate::error::{fault_from_response, transport_fault};

/// Keyring service name under which account keys are stored
pub const KEYRING_SERVICE: &str = "polysync";

// ============================================================================
// AccountKey
// ============================================================================

/// Long-lived account credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKey {
    /// Public key identifier
    pub key_id: String,
    /// Secret half of the key
    pub secret: String,
}

impl AccountKey {
    /// Creates a new AccountKey
    pub fn new(key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("key_id", &self.key_id)
            .field("secret", &crate::redact::REDACTED)
            .finish()
    }
}

// ============================================================================
// AccountAuthorizer
// ============================================================================

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    authorization_token: String,
    #[serde(default)]
    api_url: Option<String>,
}

/// Exchanges an [`AccountKey`] for session credentials
pub struct AccountAuthorizer {
    client: Client,
    authorize_url: String,
    key: AccountKey,
    scheme: AuthScheme,
}

impl AccountAuthorizer {
    /// Creates an authorizer posting to `authorize_url`
    pub fn new(client: Client, authorize_url: impl Into<String>, key: AccountKey) -> Self {
        Self {
            client,
            authorize_url: authorize_url.into(),
            key,
            scheme: AuthScheme::Raw,
        }
    }

    /// Presents issued tokens with the given scheme (default: raw)
    pub fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Loads the account key for `adapter_id` from the keyring
    ///
    /// # Returns
    /// `None` if no key is stored for this adapter
    pub fn from_keyring(
        client: Client,
        authorize_url: impl Into<String>,
        adapter_id: AdapterId,
    ) -> Result<Option<Self>> {
        Ok(KeyringCredentialStore::load(adapter_id)?
            .map(|key| Self::new(client, authorize_url, key)))
    }

    /// Performs the authorization call
    ///
    /// # Returns
    /// The session credentials and, when the backend names one, the API
    /// base URL to use with them
    ///
    /// # Errors
    /// Returns `AuthenticationFailed` if the backend rejects the key
    pub async fn authorize(&self) -> Result<(Credentials, Option<String>), SyncFault> {
        debug!(key_id = %self.key.key_id, "Authorizing account");
        let response = self
            .client
            .get(&self.authorize_url)
            .basic_auth(&self.key.key_id, Some(&self.key.secret))
            .send()
            .await
            .map_err(transport_fault)?;

        if !response.status().is_success() {
            let fault = fault_from_response(response).await;
            if matches!(fault.status, 401 | 403) {
                return Err(SyncFault::AuthenticationFailed(fault));
            }
            return Err(SyncFault::Remote(fault));
        }

        let body: AuthorizeResponse = response.json().await.map_err(transport_fault)?;
        let credentials = match self.scheme {
            AuthScheme::Bearer => Credentials::bearer(body.authorization_token),
            AuthScheme::Raw => Credentials::raw(body.authorization_token),
        };
        info!(key_id = %self.key.key_id, "Account authorized");
        Ok((credentials, body.api_url))
    }
}

#[async_trait]
impl ICredentialRefresher for AccountAuthorizer {
    async fn refresh(&self) -> Result<Credentials, SyncFault> {
        let (credentials, _) = self.authorize().await?;
        Ok(credentials)
    }
}

impl fmt::Debug for AccountAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountAuthorizer")
            .field("authorize_url", &self.authorize_url)
            .field("key", &self.key)
            .field("scheme", &self.scheme)
            .finish()
    }
}

// ============================================================================
// KeyringCredentialStore
// ============================================================================

/// Stores and retrieves account keys from the system keyring
///
/// Keys are serialized as JSON with the service name [`KEYRING_SERVICE`]
/// and the adapter id as the username.
pub struct KeyringCredentialStore;

impl KeyringCredentialStore {
    /// Stores the key for the given adapter
    pub fn store(adapter_id: AdapterId, key: &AccountKey) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &adapter_id.to_string())
            .context("Failed to create keyring entry")?;

        let json = serde_json::to_string(key).context("Failed to serialize account key")?;

        entry
            .set_password(&json)
            .context("Failed to store account key in keyring")?;

        debug!(adapter_id = %adapter_id, "Stored account key in keyring");
        Ok(())
    }

    /// Loads the key for the given adapter
    ///
    /// # Returns
    /// `Some(AccountKey)` if found, `None` if not found
    pub fn load(adapter_id: AdapterId) -> Result<Option<AccountKey>> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &adapter_id.to_string())
            .context("Failed to create keyring entry")?;

        match entry.get_password() {
            Ok(json) => {
                let key: AccountKey = serde_json::from_str(&json)
                    .context("Failed to deserialize account key from keyring")?;
                debug!(adapter_id = %adapter_id, "Loaded account key from keyring");
                Ok(Some(key))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(adapter_id = %adapter_id, "No account key found in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    /// Removes the key for the given adapter
    pub fn clear(adapter_id: AdapterId) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &adapter_id.to_string())
            .context("Failed to create keyring entry")?;

        match entry.delete_credential() {
            Ok(()) => {
                info!(adapter_id = %adapter_id, "Cleared account key from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!(adapter_id = %adapter_id, "No account key to clear");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}
