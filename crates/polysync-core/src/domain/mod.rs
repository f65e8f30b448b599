//! Domain entities and business logic
//!
//! This module contains the core domain types for polysync:
//! - Newtypes for type-safe identifiers, paths and content hashes
//! - Live backend item projections
//! - The canonical entry tree and its per-adapter identity mappings
//! - Change records and their flag bitset
//! - The fault taxonomy shared by adapters and the transfer engine
//! - Domain-specific validation errors

pub mod change;
pub mod entry;
pub mod errors;
pub mod fault;
pub mod item;
pub mod newtypes;

// Re-export commonly used types
pub use change::{compare_attributes, ChangeDetection, ChangeFlags, EntryUpdateInfo};
pub use entry::{AdapterEntryData, EntryTree, EntryType, Side, SyncEntry};
pub use errors::DomainError;
pub use fault::{FaultKind, RemoteFault, SyncFault};
pub use item::AdapterItem;
pub use newtypes::*;
