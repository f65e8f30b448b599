//! SyncEntry domain entity and the canonical entry tree
//!
//! A [`SyncEntry`] is one node of the canonical tree of synchronized items.
//! Each entry carries one [`AdapterEntryData`] per adapter that holds a copy
//! of the item, mapping the entry to that backend's own identifier.
//!
//! ## Lifecycle
//!
//! ```text
//!   discovered by Analyze ──► live ──(change flags applied)──► live
//!                              │                               │
//!                              └──────── mark_deleted ─────────┘
//!                                            │
//!                                            ▼
//!                                 deleted (kept for history)
//!                                            │ restore
//!                                            ▼
//!                                          live
//! ```
//!
//! Entries are never removed from a tree; deletion only sets a flag.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::change::ChangeFlags;
use super::errors::DomainError;
use super::item::AdapterItem;
use super::newtypes::{AdapterId, ContentHash, EntryId, HashKind, ItemId, RelativePath};

// ============================================================================
// EntryType / Side
// ============================================================================

/// Kind of a synchronized item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory / folder / prefix
    Directory,
}

/// Which end of a synchronization relationship an observation belongs to
///
/// Sizes are tracked per side because source and destination may
/// legitimately disagree until the entry is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The adapter changes are read from
    Source,
    /// The adapter changes are written to
    Destination,
}

// ============================================================================
// AdapterEntryData
// ============================================================================

/// Mapping of one entry to one backend's identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterEntryData {
    /// Adapter instance holding the item
    pub adapter_id: AdapterId,
    /// Backend identifier of the item
    pub item_id: ItemId,
    /// When the mapping was last written
    pub updated_at: DateTime<Utc>,
}

impl AdapterEntryData {
    /// Creates a mapping stamped with the current time
    pub fn new(adapter_id: AdapterId, item_id: ItemId) -> Self {
        Self {
            adapter_id,
            item_id,
            updated_at: Utc::now(),
        }
    }
}

// ============================================================================
// SyncEntry
// ============================================================================

/// A node in the canonical tree of synchronized items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntry {
    id: EntryId,
    parent_id: Option<EntryId>,
    name: String,
    entry_type: EntryType,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    source_size: u64,
    destination_size: u64,
    sha1: Option<ContentHash>,
    md5: Option<ContentHash>,
    deleted: bool,
    adapter_entries: Vec<AdapterEntryData>,
}

impl SyncEntry {
    /// Creates the root entry of a tree
    pub fn new_root() -> Self {
        let now = Utc::now();
        Self {
            id: EntryId::new(),
            parent_id: None,
            name: String::new(),
            entry_type: EntryType::Directory,
            created_at: now,
            modified_at: now,
            source_size: 0,
            destination_size: 0,
            sha1: None,
            md5: None,
            deleted: false,
            adapter_entries: Vec::new(),
        }
    }

    /// Creates a new child entry under `parent_id`
    ///
    /// # Errors
    /// Returns error if `name` is empty or contains a path separator
    pub fn new_child(
        parent_id: EntryId,
        name: impl Into<String>,
        entry_type: EntryType,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(DomainError::InvalidPath(format!(
                "Invalid entry name: {name:?}"
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: EntryId::new(),
            parent_id: Some(parent_id),
            name,
            entry_type,
            created_at: now,
            modified_at: now,
            source_size: 0,
            destination_size: 0,
            sha1: None,
            md5: None,
            deleted: false,
            adapter_entries: Vec::new(),
        })
    }

    /// Creates a child entry describing a freshly discovered backend item
    ///
    /// # Errors
    /// Returns error if the item name is not a valid entry name
    pub fn from_item(parent_id: EntryId, item: &AdapterItem, side: Side) -> Result<Self, DomainError> {
        let mut entry = Self::new_child(parent_id, item.name.clone(), item.entry_type)?;
        entry.apply_item(ChangeFlags::all_attributes(), item, side);
        entry.upsert_adapter_entry(item.adapter_id, item.item_id.clone());
        Ok(entry)
    }

    /// Reconstructs an entry from stored fields (used by repositories)
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: EntryId,
        parent_id: Option<EntryId>,
        name: String,
        entry_type: EntryType,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
        source_size: u64,
        destination_size: u64,
        sha1: Option<ContentHash>,
        md5: Option<ContentHash>,
        deleted: bool,
        adapter_entries: Vec<AdapterEntryData>,
    ) -> Self {
        Self {
            id,
            parent_id,
            name,
            entry_type,
            created_at,
            modified_at,
            source_size,
            destination_size,
            sha1,
            md5,
            deleted,
            adapter_entries,
        }
    }

    // --- accessors ---

    /// Returns the entry id
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Returns the parent id (None for the root)
    pub fn parent_id(&self) -> Option<EntryId> {
        self.parent_id
    }

    /// Returns true for the root entry
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Returns the entry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entry type
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Returns true for directories
    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    /// Creation timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification timestamp
    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Size as last observed on the given side
    pub fn size(&self, side: Side) -> u64 {
        match side {
            Side::Source => self.source_size,
            Side::Destination => self.destination_size,
        }
    }

    /// Stored hash of the requested kind
    pub fn hash(&self, kind: HashKind) -> Option<&ContentHash> {
        match kind {
            HashKind::Sha1 => self.sha1.as_ref(),
            HashKind::Md5 => self.md5.as_ref(),
        }
    }

    /// Returns true once the entry has been marked deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// All adapter mappings of this entry
    pub fn adapter_entries(&self) -> &[AdapterEntryData] {
        &self.adapter_entries
    }

    /// The mapping for one adapter, if the entry exists there
    pub fn adapter_entry(&self, adapter_id: AdapterId) -> Option<&AdapterEntryData> {
        self.adapter_entries
            .iter()
            .find(|data| data.adapter_id == adapter_id)
    }

    /// Backend id of this entry on one adapter
    pub fn item_id(&self, adapter_id: AdapterId) -> Option<&ItemId> {
        self.adapter_entry(adapter_id).map(|data| &data.item_id)
    }

    // --- mutation ---

    /// Find-or-create the mapping for `adapter_id`
    ///
    /// Repeated writes of the same entry to the same adapter update the
    /// existing mapping instead of adding a second one. Returns true if a new
    /// mapping was created.
    pub fn upsert_adapter_entry(&mut self, adapter_id: AdapterId, item_id: ItemId) -> bool {
        if let Some(existing) = self
            .adapter_entries
            .iter_mut()
            .find(|data| data.adapter_id == adapter_id)
        {
            existing.item_id = item_id;
            existing.updated_at = Utc::now();
            false
        } else {
            self.adapter_entries
                .push(AdapterEntryData::new(adapter_id, item_id));
            true
        }
    }

    /// Marks the entry deleted; the entry itself is kept
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Clears the deleted flag
    pub fn restore(&mut self) {
        self.deleted = false;
    }

    /// Sets the stored hash in the slot matching its algorithm
    pub fn set_hash(&mut self, hash: ContentHash) {
        match hash.kind() {
            HashKind::Sha1 => self.sha1 = Some(hash),
            HashKind::Md5 => self.md5 = Some(hash),
        }
    }

    /// Sets the size observed on one side
    pub fn set_size(&mut self, side: Side, size: u64) {
        match side {
            Side::Source => self.source_size = size,
            Side::Destination => self.destination_size = size,
        }
    }

    /// Merges the attributes selected by `flags` from a live item
    ///
    /// Called once a transfer succeeded, so the entry reflects what is now
    /// on the backend. Structural flags toggle the deleted state; a rename
    /// takes the item's name.
    pub fn apply_item(&mut self, flags: ChangeFlags, item: &AdapterItem, side: Side) {
        if flags.contains(ChangeFlags::CREATED_TIMESTAMP) {
            if let Some(created) = item.created_at {
                self.created_at = created;
            }
        }
        if flags.contains(ChangeFlags::MODIFIED_TIMESTAMP) {
            if let Some(modified) = item.modified_at {
                self.modified_at = modified;
            }
        }
        if flags.contains(ChangeFlags::FILE_SIZE) {
            self.set_size(side, item.size);
        }
        if flags.contains(ChangeFlags::SHA1_HASH) {
            if let Some(hash) = &item.sha1 {
                self.sha1 = Some(hash.clone());
            }
        }
        if flags.contains(ChangeFlags::MD5_HASH) {
            if let Some(hash) = &item.md5 {
                self.md5 = Some(hash.clone());
            }
        }
        if flags.contains(ChangeFlags::RENAMED) && !item.name.is_empty() {
            self.name = item.name.clone();
        }
        if flags.contains(ChangeFlags::DELETED) {
            self.mark_deleted();
        }
        if flags.contains(ChangeFlags::RESTORED) {
            self.restore();
        }
    }
}

// ============================================================================
// EntryTree
// ============================================================================

/// A validated tree of entries
///
/// Invariants: exactly one root (the only entry without a parent); every
/// other entry's parent is present in the tree and is a directory.
#[derive(Debug, Clone)]
pub struct EntryTree {
    root_id: EntryId,
    entries: HashMap<EntryId, SyncEntry>,
}

impl EntryTree {
    /// Creates a tree containing only a fresh root entry
    pub fn new() -> Self {
        let root = SyncEntry::new_root();
        let root_id = root.id();
        let mut entries = HashMap::new();
        entries.insert(root_id, root);
        Self { root_id, entries }
    }

    /// Builds a tree from a flat list of entries, validating the invariants
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidTree`] if there is not exactly one root,
    /// an id is duplicated, or a parent is missing or not a directory
    pub fn from_entries(list: Vec<SyncEntry>) -> Result<Self, DomainError> {
        let mut entries = HashMap::with_capacity(list.len());
        let mut root_id = None;

        for entry in list {
            if entry.is_root() {
                if root_id.is_some() {
                    return Err(DomainError::InvalidTree(
                        "more than one root entry".to_string(),
                    ));
                }
                root_id = Some(entry.id());
            }
            let id = entry.id();
            if entries.insert(id, entry).is_some() {
                return Err(DomainError::InvalidTree(format!("duplicate entry id {id}")));
            }
        }

        let root_id =
            root_id.ok_or_else(|| DomainError::InvalidTree("no root entry".to_string()))?;

        for entry in entries.values() {
            if let Some(parent_id) = entry.parent_id() {
                match entries.get(&parent_id) {
                    None => {
                        return Err(DomainError::InvalidTree(format!(
                            "entry {} references missing parent {}",
                            entry.id(),
                            parent_id
                        )))
                    }
                    Some(parent) if !parent.is_directory() => {
                        return Err(DomainError::InvalidTree(format!(
                            "parent {} of entry {} is not a directory",
                            parent_id,
                            entry.id()
                        )))
                    }
                    Some(_) => {}
                }
            }
        }

        let tree = Self { root_id, entries };
        // Parent links that form a cycle never reach the root.
        for id in tree.entries.keys() {
            if tree.path_of(*id).is_none() {
                return Err(DomainError::InvalidTree(format!(
                    "entry {id} is not reachable from the root"
                )));
            }
        }
        Ok(tree)
    }

    /// Returns the root entry
    pub fn root(&self) -> &SyncEntry {
        &self.entries[&self.root_id]
    }

    /// Returns the root id
    pub fn root_id(&self) -> EntryId {
        self.root_id
    }

    /// Looks up an entry
    pub fn get(&self, id: EntryId) -> Option<&SyncEntry> {
        self.entries.get(&id)
    }

    /// Looks up an entry mutably
    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut SyncEntry> {
        self.entries.get_mut(&id)
    }

    /// Number of entries, including the root and deleted entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: a tree has at least its root
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all entries in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = &SyncEntry> {
        self.entries.values()
    }

    /// Immediate children of `parent_id`, sorted by name
    pub fn children(&self, parent_id: EntryId) -> Vec<&SyncEntry> {
        let mut children: Vec<&SyncEntry> = self
            .entries
            .values()
            .filter(|entry| entry.parent_id() == Some(parent_id))
            .collect();
        children.sort_by(|a, b| a.name().cmp(b.name()));
        children
    }

    /// Live (non-deleted) child of `parent_id` with the given name
    pub fn child_named(&self, parent_id: EntryId, name: &str) -> Option<&SyncEntry> {
        self.entries.values().find(|entry| {
            entry.parent_id() == Some(parent_id) && !entry.is_deleted() && entry.name() == name
        })
    }

    /// Finds the entry mapped to `item_id` on `adapter_id`
    pub fn find_by_item(&self, adapter_id: AdapterId, item_id: &ItemId) -> Option<&SyncEntry> {
        self.entries
            .values()
            .find(|entry| entry.item_id(adapter_id) == Some(item_id))
    }

    /// Inserts a non-root entry under an existing directory
    ///
    /// # Errors
    /// Returns error if the entry is a root, already present, or its parent
    /// is missing or not a directory
    pub fn insert(&mut self, entry: SyncEntry) -> Result<EntryId, DomainError> {
        let parent_id = entry
            .parent_id()
            .ok_or_else(|| DomainError::InvalidTree("tree already has a root".to_string()))?;
        match self.entries.get(&parent_id) {
            Some(parent) if parent.is_directory() => {}
            Some(_) => {
                return Err(DomainError::InvalidTree(format!(
                    "parent {parent_id} is not a directory"
                )))
            }
            None => {
                return Err(DomainError::InvalidTree(format!(
                    "parent {parent_id} does not exist"
                )))
            }
        }
        let id = entry.id();
        if self.entries.contains_key(&id) {
            return Err(DomainError::InvalidTree(format!("duplicate entry id {id}")));
        }
        self.entries.insert(id, entry);
        Ok(id)
    }

    /// Handles an unstable backend identity: the old entry is marked deleted
    /// and `replacement` is inserted as a brand-new entry
    ///
    /// # Errors
    /// Returns error if `old_id` is unknown or the replacement cannot be inserted
    pub fn replace_identity(
        &mut self,
        old_id: EntryId,
        replacement: SyncEntry,
    ) -> Result<EntryId, DomainError> {
        let old = self
            .entries
            .get_mut(&old_id)
            .ok_or_else(|| DomainError::InvalidTree(format!("unknown entry {old_id}")))?;
        old.mark_deleted();
        self.insert(replacement)
    }

    /// Path of an entry relative to the root (the root maps to the empty path)
    pub fn path_of(&self, id: EntryId) -> Option<RelativePath> {
        let mut names = Vec::new();
        let mut current = self.entries.get(&id)?;
        let mut steps = 0usize;

        while let Some(parent_id) = current.parent_id() {
            names.push(current.name());
            current = self.entries.get(&parent_id)?;
            steps += 1;
            if steps > self.entries.len() {
                return None;
            }
        }
        if current.id() != self.root_id {
            return None;
        }

        names.reverse();
        RelativePath::new(names.join("/")).ok()
    }
}

impl Default for EntryTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_item(name: &str, size: u64) -> AdapterItem {
        AdapterItem::file(
            AdapterId::new(),
            ItemId::new(format!("id-{name}")).unwrap(),
            name,
            size,
            None,
        )
    }

    #[test]
    fn test_new_child_rejects_separator() {
        let root = SyncEntry::new_root();
        assert!(SyncEntry::new_child(root.id(), "a/b", EntryType::File).is_err());
        assert!(SyncEntry::new_child(root.id(), "", EntryType::File).is_err());
    }

    #[test]
    fn test_upsert_adapter_entry_does_not_duplicate() {
        let root = SyncEntry::new_root();
        let mut entry = SyncEntry::new_child(root.id(), "f.txt", EntryType::File).unwrap();
        let adapter = AdapterId::new();

        assert!(entry.upsert_adapter_entry(adapter, ItemId::new("v1").unwrap()));
        assert!(!entry.upsert_adapter_entry(adapter, ItemId::new("v2").unwrap()));

        assert_eq!(entry.adapter_entries().len(), 1);
        assert_eq!(entry.item_id(adapter).unwrap().as_str(), "v2");
    }

    #[test]
    fn test_upsert_keeps_other_adapters() {
        let mut entry = SyncEntry::new_root();
        let a = AdapterId::new();
        let b = AdapterId::new();
        entry.upsert_adapter_entry(a, ItemId::new("a").unwrap());
        entry.upsert_adapter_entry(b, ItemId::new("b").unwrap());
        assert_eq!(entry.adapter_entries().len(), 2);
        assert_eq!(entry.item_id(a).unwrap().as_str(), "a");
    }

    #[test]
    fn test_delete_and_restore_keep_entry() {
        let root = SyncEntry::new_root();
        let mut entry = SyncEntry::new_child(root.id(), "doc", EntryType::File).unwrap();
        entry.mark_deleted();
        assert!(entry.is_deleted());
        entry.restore();
        assert!(!entry.is_deleted());
    }

    #[test]
    fn test_apply_item_respects_flags_and_side() {
        let root = SyncEntry::new_root();
        let mut entry = SyncEntry::new_child(root.id(), "doc", EntryType::File).unwrap();
        let item = adapter_item("doc", 42);

        entry.apply_item(ChangeFlags::FILE_SIZE, &item, Side::Destination);
        assert_eq!(entry.size(Side::Destination), 42);
        assert_eq!(entry.size(Side::Source), 0);

        entry.apply_item(ChangeFlags::MODIFIED_TIMESTAMP, &item, Side::Source);
        assert_eq!(entry.size(Side::Source), 0);
    }

    #[test]
    fn test_from_item_records_mapping() {
        let root = SyncEntry::new_root();
        let item = adapter_item("photo.jpg", 1024);
        let entry = SyncEntry::from_item(root.id(), &item, Side::Source).unwrap();
        assert_eq!(entry.name(), "photo.jpg");
        assert_eq!(entry.size(Side::Source), 1024);
        assert_eq!(entry.item_id(item.adapter_id), Some(&item.item_id));
    }

    #[test]
    fn test_tree_paths() {
        let mut tree = EntryTree::new();
        let dir = SyncEntry::new_child(tree.root_id(), "a", EntryType::Directory).unwrap();
        let dir_id = tree.insert(dir).unwrap();
        let file = SyncEntry::new_child(dir_id, "b.txt", EntryType::File).unwrap();
        let file_id = tree.insert(file).unwrap();

        assert_eq!(tree.path_of(file_id).unwrap().as_str(), "a/b.txt");
        assert!(tree.path_of(tree.root_id()).unwrap().is_root());
        assert_eq!(tree.children(dir_id).len(), 1);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_tree_rejects_file_parent() {
        let mut tree = EntryTree::new();
        let file = SyncEntry::new_child(tree.root_id(), "f", EntryType::File).unwrap();
        let file_id = tree.insert(file).unwrap();
        let child = SyncEntry::new_child(file_id, "x", EntryType::File).unwrap();
        assert!(tree.insert(child).is_err());
    }

    #[test]
    fn test_from_entries_requires_single_root() {
        let err = EntryTree::from_entries(vec![SyncEntry::new_root(), SyncEntry::new_root()])
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTree(_)));

        let err = EntryTree::from_entries(Vec::new()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTree(_)));
    }

    #[test]
    fn test_from_entries_requires_parent() {
        let root = SyncEntry::new_root();
        let orphan = SyncEntry::new_child(EntryId::new(), "orphan", EntryType::File).unwrap();
        assert!(EntryTree::from_entries(vec![root, orphan]).is_err());
    }

    #[test]
    fn test_from_entries_accepts_valid_tree() {
        let root = SyncEntry::new_root();
        let dir = SyncEntry::new_child(root.id(), "d", EntryType::Directory).unwrap();
        let file = SyncEntry::new_child(dir.id(), "f", EntryType::File).unwrap();
        let file_id = file.id();
        let tree = EntryTree::from_entries(vec![file, dir, root]).unwrap();
        assert_eq!(tree.path_of(file_id).unwrap().as_str(), "d/f");
    }

    #[test]
    fn test_replace_identity_marks_old_deleted() {
        let mut tree = EntryTree::new();
        let old = SyncEntry::new_child(tree.root_id(), "f", EntryType::File).unwrap();
        let old_id = tree.insert(old).unwrap();

        let replacement = SyncEntry::new_child(tree.root_id(), "f", EntryType::File).unwrap();
        let new_id = tree.replace_identity(old_id, replacement).unwrap();

        assert_ne!(old_id, new_id);
        assert!(tree.get(old_id).unwrap().is_deleted());
        assert!(!tree.get(new_id).unwrap().is_deleted());
        assert_eq!(tree.child_named(tree.root_id(), "f").unwrap().id(), new_id);
    }
}
