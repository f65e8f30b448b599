//! Fault taxonomy for adapter and transfer operations
//!
//! Every adapter operation, transfer-engine call and remote request reports
//! failure through [`SyncFault`]. Callers branch on [`SyncFault::kind`]
//! rather than on the concrete variant, so expected outcomes (a cancelled
//! upload, a size mismatch) are told apart from unexpected ones without
//! inspecting error messages.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Uniform shape of an error reported by a remote backend
///
/// Produced by translating the provider's error payload at the wire
/// boundary. `code` is the provider's own error code when one was present
/// in the payload (`"expired_auth_token"`, `"InvalidRange"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFault {
    /// HTTP (or HTTP-equivalent) status code
    pub status: u16,
    /// Provider-specific error code, if the payload carried one
    pub code: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl RemoteFault {
    /// Creates a new RemoteFault
    pub fn new(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Returns true for throttling, timeouts and server-side errors
    pub fn is_transient(&self) -> bool {
        matches!(self.status, 408 | 429) || (500..=599).contains(&self.status)
    }

    /// Returns the provider code or an empty string
    pub fn code_str(&self) -> &str {
        self.code.as_deref().unwrap_or("")
    }
}

impl Display for RemoteFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "HTTP {} ({}): {}", self.status, code, self.message),
            None => write!(f, "HTTP {}: {}", self.status, self.message),
        }
    }
}

/// Coarse classification of a [`SyncFault`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Throttling, timeouts, 5xx, network trouble; retry policy belongs to the caller
    Transient,
    /// Any other remote failure status
    Remote,
    /// Authentication still rejected after one credential refresh
    AuthenticationFailed,
    /// Declared and actual sizes or hashes disagree
    Integrity,
    /// Programmer error in the caller (write past declared length, unsupported capability)
    ContractViolation,
    /// The caller aborted the transfer
    Cancelled,
    /// Local I/O failure
    Io,
}

/// Errors produced by adapters, the transfer engine and the request envelope
#[derive(Debug, Error)]
pub enum SyncFault {
    /// A remote call failed with a translated provider error
    #[error("Remote error: {0}")]
    Remote(RemoteFault),

    /// The backend rejected credentials again right after a refresh
    #[error("Authentication failed after credential refresh: {0}")]
    AuthenticationFailed(RemoteFault),

    /// The transport failed before a response was received
    #[error("Transport error: {0}")]
    Transport(String),

    /// Bytes received do not match the declared length
    #[error("Size mismatch: declared {declared} bytes, got {actual}")]
    SizeMismatch {
        /// Length the transfer was opened with
        declared: u64,
        /// Length actually observed
        actual: u64,
    },

    /// A part or object hash was rejected or did not match
    #[error("Integrity check failed for part {part_number}: {message}")]
    IntegrityMismatch {
        /// 1-based part number (0 when the whole object is concerned)
        part_number: u32,
        /// Description of the mismatch
        message: String,
    },

    /// The caller broke the contract of the operation
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// The transfer was cancelled by the caller
    #[error("Transfer cancelled")]
    Cancelled,

    /// Local I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncFault {
    /// Classifies this fault
    pub fn kind(&self) -> FaultKind {
        match self {
            SyncFault::Remote(fault) if fault.is_transient() => FaultKind::Transient,
            SyncFault::Remote(_) => FaultKind::Remote,
            SyncFault::AuthenticationFailed(_) => FaultKind::AuthenticationFailed,
            SyncFault::Transport(_) => FaultKind::Transient,
            SyncFault::SizeMismatch { .. } | SyncFault::IntegrityMismatch { .. } => {
                FaultKind::Integrity
            }
            SyncFault::ContractViolation(_) => FaultKind::ContractViolation,
            SyncFault::Cancelled => FaultKind::Cancelled,
            SyncFault::Io(_) => FaultKind::Io,
        }
    }

    /// Returns true if the rest of the pass should stop using this adapter
    ///
    /// Only contract violations and a repeated authentication failure qualify;
    /// every other fault is confined to the entry that produced it.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self.kind(),
            FaultKind::ContractViolation | FaultKind::AuthenticationFailed
        )
    }

    /// Returns the remote fault details, if this fault came from a backend response
    pub fn remote(&self) -> Option<&RemoteFault> {
        match self {
            SyncFault::Remote(fault) | SyncFault::AuthenticationFailed(fault) => Some(fault),
            _ => None,
        }
    }

    /// Shorthand for a contract violation
    pub fn contract(message: impl Into<String>) -> Self {
        SyncFault::ContractViolation(message.into())
    }

    /// Short machine-readable code, used in per-entry outcomes and logs
    pub fn code(&self) -> &'static str {
        match self.kind() {
            FaultKind::Transient => "TRANSIENT",
            FaultKind::Remote => "REMOTE",
            FaultKind::AuthenticationFailed => "AUTH_FAILED",
            FaultKind::Integrity => "INTEGRITY",
            FaultKind::ContractViolation => "CONTRACT_VIOLATION",
            FaultKind::Cancelled => "CANCELLED",
            FaultKind::Io => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        for status in [408, 429, 500, 503, 599] {
            assert!(RemoteFault::new(status, None, "x").is_transient(), "{status}");
        }
        for status in [400, 401, 403, 404, 409] {
            assert!(!RemoteFault::new(status, None, "x").is_transient(), "{status}");
        }
    }

    #[test]
    fn test_kind_classification() {
        let throttled = SyncFault::Remote(RemoteFault::new(429, None, "slow down"));
        assert_eq!(throttled.kind(), FaultKind::Transient);

        let missing = SyncFault::Remote(RemoteFault::new(404, Some("not_found".into()), "gone"));
        assert_eq!(missing.kind(), FaultKind::Remote);

        let mismatch = SyncFault::SizeMismatch {
            declared: 10,
            actual: 9,
        };
        assert_eq!(mismatch.kind(), FaultKind::Integrity);
        assert_eq!(SyncFault::Cancelled.kind(), FaultKind::Cancelled);
    }

    #[test]
    fn test_unrecoverable_faults() {
        assert!(SyncFault::contract("seek on forward-only stream").is_unrecoverable());
        assert!(
            SyncFault::AuthenticationFailed(RemoteFault::new(401, None, "expired"))
                .is_unrecoverable()
        );
        assert!(!SyncFault::Transport("reset".into()).is_unrecoverable());
        assert!(!SyncFault::Cancelled.is_unrecoverable());
    }

    #[test]
    fn test_remote_fault_display() {
        let fault = RemoteFault::new(401, Some("expired_auth_token".into()), "token expired");
        assert_eq!(
            fault.to_string(),
            "HTTP 401 (expired_auth_token): token expired"
        );
        assert_eq!(RemoteFault::new(500, None, "boom").to_string(), "HTTP 500: boom");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let fault: SyncFault = io.into();
        assert_eq!(fault.kind(), FaultKind::Io);
        assert_eq!(fault.code(), "IO");
    }
}
