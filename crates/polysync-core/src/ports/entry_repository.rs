//! Entry repository port (driven/secondary port)
//!
//! Persistence boundary for the canonical entry tree.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory, ...) and don't need domain-level classification.
//! - Trees are walked level by level through [`IEntryRepository::get_children`].
//! - Adapter mappings are upserted keyed by (entry, adapter), never appended.

use async_trait::async_trait;

use crate::domain::{AdapterEntryData, AdapterId, EntryId, EntryTree, ItemId, SyncEntry};

/// Port trait for entry persistence
#[async_trait]
pub trait IEntryRepository: Send + Sync {
    /// Inserts or replaces an entry, including its adapter mappings
    async fn save_entry(&self, entry: &SyncEntry) -> anyhow::Result<()>;

    /// Fetches one entry by id
    async fn get_entry(&self, id: EntryId) -> anyhow::Result<Option<SyncEntry>>;

    /// Fetches the children of `parent`; `None` fetches the root(s)
    async fn get_children(&self, parent: Option<EntryId>) -> anyhow::Result<Vec<SyncEntry>>;

    /// Find-or-create the mapping of `entry_id` on `data.adapter_id`
    async fn upsert_adapter_entry(
        &self,
        entry_id: EntryId,
        data: &AdapterEntryData,
    ) -> anyhow::Result<()>;

    /// Finds the entry mapped to `item_id` on `adapter_id`
    async fn find_by_item_id(
        &self,
        adapter_id: AdapterId,
        item_id: &ItemId,
    ) -> anyhow::Result<Option<SyncEntry>>;

    /// Loads the whole tree by walking it breadth-first from the root
    ///
    /// Returns `None` if nothing has been stored yet.
    async fn load_tree(&self) -> anyhow::Result<Option<EntryTree>> {
        let mut entries = self.get_children(None).await?;
        if entries.is_empty() {
            return Ok(None);
        }

        let mut frontier: Vec<EntryId> = entries
            .iter()
            .filter(|entry| entry.is_directory())
            .map(SyncEntry::id)
            .collect();
        while let Some(parent) = frontier.pop() {
            let children = self.get_children(Some(parent)).await?;
            frontier.extend(
                children
                    .iter()
                    .filter(|entry| entry.is_directory())
                    .map(SyncEntry::id),
            );
            entries.extend(children);
        }

        Ok(Some(EntryTree::from_entries(entries)?))
    }

    /// Persists every entry of a tree
    async fn save_tree(&self, tree: &EntryTree) -> anyhow::Result<()> {
        for entry in tree.iter() {
            self.save_entry(entry).await?;
        }
        Ok(())
    }
}
