//! Live backend item projection
//!
//! [`AdapterItem`] is what an adapter hands back when it enumerates a
//! folder: a read-only snapshot of one backend item. It is never persisted;
//! the Analyze phase reconciles it into a [`SyncEntry`](super::SyncEntry)
//! and drops it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::EntryType;
use super::newtypes::{AdapterId, ContentHash, HashKind, ItemId};

/// Read-only projection of a live backend item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterItem {
    /// Adapter instance that produced this item
    pub adapter_id: AdapterId,
    /// Provider-specific unique id
    pub item_id: ItemId,
    /// Item name (last path component)
    pub name: String,
    /// File or directory
    pub entry_type: EntryType,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Creation timestamp, when the backend exposes one
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification timestamp
    pub modified_at: Option<DateTime<Utc>>,
    /// SHA-1 of the content, when the backend reports it without extra I/O
    pub sha1: Option<ContentHash>,
    /// MD5 of the content, when the backend reports it without extra I/O
    pub md5: Option<ContentHash>,
    /// Id of the parent item (None for the adapter root)
    pub parent_id: Option<ItemId>,
}

impl AdapterItem {
    /// Creates a directory item with no size or hashes
    pub fn directory(
        adapter_id: AdapterId,
        item_id: ItemId,
        name: impl Into<String>,
        parent_id: Option<ItemId>,
    ) -> Self {
        Self {
            adapter_id,
            item_id,
            name: name.into(),
            entry_type: EntryType::Directory,
            size: 0,
            created_at: None,
            modified_at: None,
            sha1: None,
            md5: None,
            parent_id,
        }
    }

    /// Creates a file item of the given size
    pub fn file(
        adapter_id: AdapterId,
        item_id: ItemId,
        name: impl Into<String>,
        size: u64,
        parent_id: Option<ItemId>,
    ) -> Self {
        Self {
            adapter_id,
            item_id,
            name: name.into(),
            entry_type: EntryType::File,
            size,
            created_at: None,
            modified_at: None,
            sha1: None,
            md5: None,
            parent_id,
        }
    }

    /// Sets both timestamps
    pub fn with_timestamps(
        mut self,
        created_at: Option<DateTime<Utc>>,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_at = created_at;
        self.modified_at = modified_at;
        self
    }

    /// Attaches a content hash in the slot matching its algorithm
    pub fn with_hash(mut self, hash: ContentHash) -> Self {
        match hash.kind() {
            HashKind::Sha1 => self.sha1 = Some(hash),
            HashKind::Md5 => self.md5 = Some(hash),
        }
        self
    }

    /// Returns true for directories
    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    /// Returns the hash of the requested kind, if known
    pub fn hash(&self, kind: HashKind) -> Option<&ContentHash> {
        match kind {
            HashKind::Sha1 => self.sha1.as_ref(),
            HashKind::Md5 => self.md5.as_ref(),
        }
    }
}
