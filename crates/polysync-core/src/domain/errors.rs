//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures of newtypes and entry-tree invariants.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid provider-specific item identifier
    #[error("Invalid item ID: {0}")]
    InvalidItemId(String),

    /// Invalid hash format (expected lowercase hex of the right length)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid delta cursor
    #[error("Invalid delta cursor: {0}")]
    InvalidDeltaCursor(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// The entry tree violates one of its structural invariants
    #[error("Invalid entry tree: {0}")]
    InvalidTree(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
