//! polysync HTTP - Resilient request envelope and reference storage binding
//!
//! Every outbound call of a networked adapter goes through one
//! [`RequestEnvelope`](envelope::RequestEnvelope): send, refresh the
//! credentials once if the backend reports them expired, replay the same
//! buffered request, and translate any remaining failure into a uniform
//! [`RemoteFault`](polysync_core::domain::RemoteFault).
//!
//! ## Modules
//!
//! - [`request`] - Buffered, replayable request description
//! - [`envelope`] - Single-refresh retry wrapper and credential types
//! - [`error`] - Translation of provider error payloads
//! - [`redact`] - Header redaction for logs
//! - [`client`] - Base URL plus envelope, shared by the bindings
//! - [`auth`] - Account authorization and keyring-backed key storage
//! - [`multipart`] - JSON multipart upload endpoints
//! - [`download`] - Ranged fragment reads
//! - [`upload`] - Single-shot uploads for small objects
//! - [`transfer`] - Upload and download handles sized by [`TransferConfig`](polysync_core::config::TransferConfig)

pub mod auth;
pub mod client;
pub mod download;
pub mod envelope;
pub mod error;
pub mod multipart;
pub mod redact;
pub mod request;
pub mod transfer;
pub mod upload;

pub use client::ApiClient;
pub use envelope::{AuthExpiryPolicy, AuthScheme, Credentials, ICredentialRefresher, RequestEnvelope};
pub use error::translate_error;
pub use request::ReplayableRequest;
pub use transfer::TransferFactory;
