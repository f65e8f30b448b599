//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the core depends on; their implementations live
//! in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IAdapter`] - Storage backend contract (enumerate, read, write, delete, hash, detect change)
//! - [`IPushNotifiable`] / [`IChangeTrackable`] - Optional backend capabilities
//! - [`IEntryRepository`] - Persistent storage for the entry tree

pub mod adapter;
pub mod entry_repository;

pub use adapter::{
    AdapterCapabilities, ChangeNotification, CommittedItem, Enumeration, IAdapter,
    IChangeTrackable, IPushNotifiable, IReadStream, IWriteStream, ItemFault, TrackedChanges,
};
pub use entry_repository::IEntryRepository;
