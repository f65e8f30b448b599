//! Adapter port (driven/secondary port)
//!
//! Every storage backend (local filesystem, object store, cloud drive)
//! implements [`IAdapter`] so the rest of the engine stays backend-agnostic.
//!
//! ## Design Notes
//!
//! - Errors are [`SyncFault`] rather than `anyhow::Error`: callers of the
//!   Apply phase branch on [`SyncFault::kind`] to tell expected outcomes
//!   from unrecoverable ones.
//! - Read and write handles are single-use, forward-only and bound to one
//!   entry. There is no seek.
//! - [`IAdapter::detect_change`] is synchronous on purpose: it must be a pure
//!   in-memory comparison and can never reach the network or the disk.
//! - Optional capabilities are reached through `as_*` queries returning
//!   `Option`, never by downcasting the adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AdapterId, AdapterItem, AdapterTypeId, ChangeDetection, ContentHash, DeltaCursor,
    EntryUpdateInfo, HashKind, ItemId, RelativePath, Side, SyncEntry, SyncFault,
};

// ============================================================================
// Capabilities and DTOs
// ============================================================================

/// Optional features a backend declares support for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterCapabilities {
    /// Backend pushes change notifications ([`IPushNotifiable`])
    pub push_notifications: bool,
    /// Backend exposes a delta cursor ([`IChangeTrackable`])
    pub change_tracking: bool,
    /// Large writes go through a multipart session
    pub multipart_upload: bool,
    /// Reads are served as fixed-size ranges
    pub fragmented_download: bool,
}

/// A fault tied to one child discovered during enumeration
#[derive(Debug)]
pub struct ItemFault {
    /// Name of the child that could not be inspected
    pub name: String,
    /// What went wrong
    pub fault: SyncFault,
}

/// Result of listing one folder
///
/// Children that could not be inspected are reported in `faults` instead
/// of failing the whole listing.
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Immediate children of the folder
    pub items: Vec<AdapterItem>,
    /// Per-child failures
    pub faults: Vec<ItemFault>,
}

impl Enumeration {
    /// An enumeration without faults
    pub fn from_items(items: Vec<AdapterItem>) -> Self {
        Self {
            items,
            faults: Vec::new(),
        }
    }

    /// True if the folder has no children and nothing failed
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.faults.is_empty()
    }
}

/// Outcome of committing a write handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedItem {
    /// Final backend identifier of the written object
    pub item_id: ItemId,
    /// Number of bytes committed
    pub size: u64,
    /// Content hash, when the backend computed or verified one
    pub hash: Option<ContentHash>,
}

/// A change pushed by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Path that changed, relative to the adapter root
    pub relative_path: RelativePath,
    /// When the backend observed the change
    pub observed_at: DateTime<Utc>,
}

/// Changes reported by a pull change-tracking backend
#[derive(Debug, Clone, Default)]
pub struct TrackedChanges {
    /// Items created or modified since the cursor
    pub items: Vec<AdapterItem>,
    /// Items removed since the cursor
    pub removed: Vec<ItemId>,
    /// Cursor to persist and pass to the next call
    pub cursor: Option<DeltaCursor>,
}

// ============================================================================
// Stream handles
// ============================================================================

/// Forward-only byte source bound to one entry
#[async_trait]
pub trait IReadStream: Send {
    /// Reads up to `buf.len()` bytes
    ///
    /// Returns fewer bytes than requested (including zero) only once the
    /// end of the content is reached.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SyncFault>;
}

/// Forward-only byte sink bound to one entry and a declared length
#[async_trait]
pub trait IWriteStream: Send {
    /// Appends bytes; writing past the declared length is a contract violation
    async fn write(&mut self, data: &[u8]) -> Result<(), SyncFault>;

    /// Pushes buffered bytes that are ready to go
    async fn flush(&mut self) -> Result<(), SyncFault>;

    /// Bytes accepted so far
    fn bytes_written(&self) -> u64;

    /// Length declared when the handle was opened
    fn expected_length(&self) -> u64;

    /// Makes the written content visible on the backend
    ///
    /// Fails without committing anything if fewer bytes than declared were
    /// written.
    async fn commit(self: Box<Self>) -> Result<CommittedItem, SyncFault>;

    /// Discards the partial content on the backend
    async fn abort(self: Box<Self>) -> Result<(), SyncFault>;
}

// ============================================================================
// IAdapter
// ============================================================================

/// Port trait for storage backends
#[async_trait]
pub trait IAdapter: Send + Sync {
    /// Identifier of this adapter instance
    fn adapter_id(&self) -> AdapterId;

    /// Stable identifier of the adapter implementation
    fn adapter_type(&self) -> AdapterTypeId;

    /// Optional features of this backend
    fn capabilities(&self) -> AdapterCapabilities;

    /// The item enumeration starts from
    async fn root(&self) -> Result<AdapterItem, SyncFault>;

    /// Lists the immediate children of `folder` without recursing
    ///
    /// An empty folder yields an empty [`Enumeration`]. Failures of the folder
    /// itself are returned as `Err`; failures of single children are reported
    /// in [`Enumeration::faults`].
    async fn enumerate_children(&self, folder: &AdapterItem) -> Result<Enumeration, SyncFault>;

    /// Opens a forward-only reader on the entry's content
    async fn open_read_stream(
        &self,
        update: &EntryUpdateInfo,
    ) -> Result<Box<dyn IReadStream>, SyncFault>;

    /// Opens a forward-only writer for exactly `expected_length` bytes
    async fn open_write_stream(
        &self,
        update: &EntryUpdateInfo,
        expected_length: u64,
    ) -> Result<Box<dyn IWriteStream>, SyncFault>;

    /// Creates the directory described by `update` and returns its backend id
    async fn create_directory(&self, update: &EntryUpdateInfo) -> Result<ItemId, SyncFault>;

    /// Deletes the item described by `update`
    async fn delete_item(&self, update: &EntryUpdateInfo) -> Result<(), SyncFault>;

    /// Compares a known entry against a live item
    ///
    /// Must not perform any I/O.
    fn detect_change(&self, known: &SyncEntry, live: &AdapterItem, side: Side) -> ChangeDetection;

    /// Computes a content hash, or `None` if this backend cannot produce `kind`
    ///
    /// `None` means "hash unavailable", never "hash mismatch".
    async fn compute_hash(
        &self,
        kind: HashKind,
        item: &AdapterItem,
    ) -> Result<Option<ContentHash>, SyncFault>;

    /// Commits a write handle and records the backend id on the entry
    async fn finalize_write(
        &self,
        sink: Box<dyn IWriteStream>,
        update: &mut EntryUpdateInfo,
    ) -> Result<CommittedItem, SyncFault> {
        let committed = sink.commit().await?;
        update
            .entry
            .upsert_adapter_entry(self.adapter_id(), committed.item_id.clone());
        Ok(committed)
    }

    /// Push-notification capability, if supported
    fn as_push_notifiable(&self) -> Option<&dyn IPushNotifiable> {
        None
    }

    /// Pull change-tracking capability, if supported
    fn as_change_trackable(&self) -> Option<&dyn IChangeTrackable> {
        None
    }
}

// ============================================================================
// Optional capabilities
// ============================================================================

/// Backend that pushes change events
pub trait IPushNotifiable: Send + Sync {
    /// Turns notification delivery on or off
    fn set_notifications_enabled(&self, enabled: bool) -> Result<(), SyncFault>;

    /// Whether notifications are currently delivered
    fn notifications_enabled(&self) -> bool;

    /// When a polling fallback should check again
    fn next_check_time(&self) -> Option<DateTime<Utc>>;

    /// Takes the notifications received since the previous call
    fn drain_notifications(&self) -> Vec<ChangeNotification>;
}

/// Backend that reports changes since an opaque cursor
#[async_trait]
pub trait IChangeTrackable: Send + Sync {
    /// Changes since `cursor`; `None` requests a full initial listing
    async fn changes_since(&self, cursor: Option<&DeltaCursor>)
        -> Result<TrackedChanges, SyncFault>;
}
