//! Mirror command - Copy one local directory tree onto another
//!
//! Walks both trees through [`LocalAdapter`]s, turns the differences into
//! change records and hands them to the apply use case, which orders them
//! and executes them one at a time.
//!
//! A file is copied again when its size differs, when the source copy is
//! newer, or (with `--checksum`) when the SHA-1 digests differ. Items only
//! present in the destination are removed with `--delete`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use polysync_cache::{DatabasePool, SqliteEntryRepository};
use polysync_core::config::Config;
use polysync_core::domain::{
    AdapterId, AdapterItem, ChangeDetection, ChangeFlags, EntryId, EntryUpdateInfo, HashKind,
    RelativePath, Side, SyncEntry,
};
use polysync_core::ports::{IAdapter, IEntryRepository};
use polysync_core::usecases::{order_changes, ApplyChangesUseCase, EntryStatus};
use polysync_sync::{LocalAdapter, LocalAdapterConfig};
use tracing::{debug, info, warn};

use crate::output::{get_formatter, OutputFormat};

/// Arguments for the mirror subcommand
#[derive(Debug, clap::Args)]
pub struct MirrorCommand {
    /// Directory to copy from
    pub source: PathBuf,
    /// Directory to copy into
    pub destination: PathBuf,
    /// Remove destination items that do not exist in the source
    #[arg(long)]
    pub delete: bool,
    /// Compare SHA-1 digests of same-sized files
    #[arg(long)]
    pub checksum: bool,
    /// Print the planned changes without applying them
    #[arg(long)]
    pub dry_run: bool,
    /// Record applied entries in the configured entry database
    #[arg(long)]
    pub record: bool,
}

/// Every item of one tree, keyed by path
pub(crate) struct TreeListing {
    root: AdapterItem,
    items: BTreeMap<RelativePath, AdapterItem>,
    faults: usize,
}

/// Walks a whole adapter tree breadth-first
pub(crate) async fn walk(adapter: &dyn IAdapter) -> Result<TreeListing> {
    let root = adapter.root().await?;
    let mut items = BTreeMap::new();
    let mut faults = 0;
    let mut pending = VecDeque::from([(RelativePath::root(), root.clone())]);

    while let Some((path, folder)) = pending.pop_front() {
        let listing = adapter.enumerate_children(&folder).await?;
        for fault in listing.faults {
            warn!(folder = %path, name = %fault.name, error = %fault.fault, "Skipping item");
            faults += 1;
        }
        for item in listing.items {
            let child = path.join(&item.name)?;
            if item.is_directory() {
                pending.push_back((child.clone(), item.clone()));
            }
            items.insert(child, item);
        }
    }

    debug!(items = items.len(), faults, "Tree walked");
    Ok(TreeListing {
        root,
        items,
        faults,
    })
}

/// Turns two tree listings into unordered change records
pub(crate) struct MirrorPlanner<'a> {
    source: &'a dyn IAdapter,
    destination: &'a dyn IAdapter,
    checksum: bool,
    delete: bool,
}

impl<'a> MirrorPlanner<'a> {
    async fn same_content(&self, src: &AdapterItem, dst: &AdapterItem) -> Result<bool> {
        let left = self.source.compute_hash(HashKind::Sha1, src).await?;
        let right = self.destination.compute_hash(HashKind::Sha1, dst).await?;
        Ok(match (left, right) {
            (Some(left), Some(right)) => left == right,
            _ => true,
        })
    }

    /// Flags that call for a transfer, ignoring timestamp noise
    async fn update_flags(
        &self,
        src: &AdapterItem,
        dst: &AdapterItem,
        known: &SyncEntry,
    ) -> Result<ChangeDetection> {
        let detection = self.source.detect_change(known, src, Side::Source);
        if detection.replaces_identity {
            return Ok(detection);
        }
        if src.is_directory() {
            return Ok(ChangeDetection::unchanged());
        }

        let mut flags = ChangeFlags::NONE;
        if detection.flags.contains(ChangeFlags::FILE_SIZE) {
            flags |= ChangeFlags::FILE_SIZE;
        }
        if let (Some(src_time), Some(dst_time)) = (src.modified_at, dst.modified_at) {
            if src_time.timestamp() > dst_time.timestamp() {
                flags |= ChangeFlags::MODIFIED_TIMESTAMP;
            }
        }
        if flags.is_empty() && self.checksum && !self.same_content(src, dst).await? {
            flags |= ChangeFlags::SHA1_HASH;
        }
        Ok(ChangeDetection::from_flags(flags))
    }

    pub(crate) async fn plan(
        &self,
        source: &TreeListing,
        destination: &TreeListing,
    ) -> Result<(Vec<EntryUpdateInfo>, Vec<RelativePath>)> {
        let mut root = SyncEntry::new_root();
        root.upsert_adapter_entry(self.source.adapter_id(), source.root.item_id.clone());
        root.upsert_adapter_entry(self.destination.adapter_id(), destination.root.item_id.clone());

        let mut ids: HashMap<RelativePath, EntryId> = HashMap::new();
        ids.insert(RelativePath::root(), root.id());
        let parent_of = |ids: &HashMap<RelativePath, EntryId>, path: &RelativePath| {
            path.parent()
                .and_then(|parent| ids.get(&parent).copied())
                .with_context(|| format!("No parent entry for {path}"))
        };

        let mut changes = Vec::new();
        let mut replaced = Vec::new();

        for (path, src) in &source.items {
            let parent_id = parent_of(&ids, path)?;
            let mut entry = SyncEntry::from_item(parent_id, src, Side::Source)?;
            ids.insert(path.clone(), entry.id());

            let detection = match destination.items.get(path) {
                None => ChangeDetection::created(src.entry_type),
                Some(dst) => {
                    let known = SyncEntry::from_item(parent_id, dst, Side::Source)?;
                    let detection = self.update_flags(src, dst, &known).await?;
                    if detection.replaces_identity {
                        replaced.push(path.clone());
                    } else {
                        entry.upsert_adapter_entry(
                            self.destination.adapter_id(),
                            dst.item_id.clone(),
                        );
                    }
                    detection
                }
            };

            if detection.changed {
                changes.push(EntryUpdateInfo::new(entry, path.clone(), detection.flags));
            }
        }

        if self.delete {
            for (path, dst) in &destination.items {
                if source.items.contains_key(path)
                    || replaced.iter().any(|r| r.is_ancestor_of(path))
                {
                    continue;
                }
                let parent_id = parent_of(&ids, path)?;
                let mut entry = SyncEntry::from_item(parent_id, dst, Side::Destination)?;
                ids.insert(path.clone(), entry.id());
                entry.mark_deleted();
                changes.push(EntryUpdateInfo::new(entry, path.clone(), ChangeFlags::DELETED));
            }
        }

        Ok((changes, replaced))
    }
}

fn open_adapter(path: &Path, role: &str) -> Result<Arc<LocalAdapter>> {
    let adapter = LocalAdapter::new(AdapterId::new(), LocalAdapterConfig::new(path))
        .with_context(|| format!("Cannot use {} as the {role}", path.display()))?;
    Ok(Arc::new(adapter))
}

impl MirrorCommand {
    /// Execute the mirror command
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let source = open_adapter(&self.source, "source")?;
        let destination = open_adapter(&self.destination, "destination")?;

        info!(
            source = %self.source.display(),
            destination = %self.destination.display(),
            "Mirroring"
        );

        let source_tree = walk(source.as_ref()).await?;
        let destination_tree = walk(destination.as_ref()).await?;
        let skipped = source_tree.faults + destination_tree.faults;
        if skipped > 0 {
            formatter.warn(&format!("{skipped} item(s) could not be inspected"));
        }

        let planner = MirrorPlanner {
            source: source.as_ref(),
            destination: destination.as_ref(),
            checksum: self.checksum,
            delete: self.delete,
        };
        let (changes, replaced) = planner.plan(&source_tree, &destination_tree).await?;

        if self.dry_run {
            let ordered = order_changes(changes);
            if format.is_json() {
                let plan: Vec<serde_json::Value> = ordered
                    .iter()
                    .map(|u| {
                        serde_json::json!({
                            "path": u.relative_path.as_str(),
                            "flags": u.flags.names(),
                        })
                    })
                    .collect();
                formatter.print_json(&serde_json::json!({
                    "dry_run": true,
                    "replaced": replaced.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
                    "changes": plan,
                }));
            } else {
                formatter.success(&format!("{} change(s) planned", ordered.len()));
                for path in &replaced {
                    formatter.row("!", path.as_str(), "type changed, replaced");
                }
                for update in &ordered {
                    formatter.row("~", update.relative_path.as_str(), &update.flags.to_string());
                }
            }
            return Ok(());
        }

        // Items whose type changed must go before their replacement is created
        for path in &replaced {
            let stale = destination_tree
                .items
                .get(path)
                .map(|item| SyncEntry::from_item(EntryId::new(), item, Side::Destination))
                .transpose()?;
            if let Some(entry) = stale {
                let update = EntryUpdateInfo::new(entry, path.clone(), ChangeFlags::DELETED);
                destination.delete_item(&update).await?;
                debug!(path = %path, "Removed item replaced by a different type");
            }
        }

        let mut use_case = ApplyChangesUseCase::new(
            source.clone() as Arc<dyn IAdapter>,
            destination.clone() as Arc<dyn IAdapter>,
        );
        let pool = if self.record {
            let pool = DatabasePool::new(&config.database.path)
                .await
                .context("Failed to open the entry database")?;
            let repository: Arc<dyn IEntryRepository> =
                Arc::new(SqliteEntryRepository::new(pool.pool().clone()));
            use_case = use_case.with_repository(repository);
            Some(pool)
        } else {
            None
        };

        let report = use_case.execute(changes).await;
        if let Some(pool) = pool {
            pool.close().await;
        }

        if format.is_json() {
            let outcomes: Vec<serde_json::Value> = report
                .outcomes
                .iter()
                .map(|o| {
                    serde_json::json!({
                        "path": o.relative_path.as_str(),
                        "flags": o.flags.names(),
                        "outcome": o.status,
                    })
                })
                .collect();
            formatter.print_json(&serde_json::json!({
                "applied": report.applied(),
                "failed": report.failed(),
                "skipped": report.skipped(),
                "outcomes": outcomes,
            }));
        } else {
            for outcome in &report.outcomes {
                let (marker, detail) = match &outcome.status {
                    EntryStatus::Applied => ("\u{2713}", outcome.flags.to_string()),
                    EntryStatus::Failed { code, message } => {
                        ("\u{2717}", format!("{code}: {message}"))
                    }
                    EntryStatus::Skipped => ("-", "skipped".to_string()),
                };
                formatter.row(marker, outcome.relative_path.as_str(), &detail);
            }
            formatter.success(&format!(
                "{} applied, {} failed, {} skipped",
                report.applied(),
                report.failed(),
                report.skipped()
            ));
        }

        if report.failed() > 0 || report.skipped() > 0 {
            bail!(
                "{} change(s) failed and {} were skipped",
                report.failed(),
                report.skipped()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn adapter(dir: &TempDir) -> LocalAdapter {
        LocalAdapter::new(AdapterId::new(), LocalAdapterConfig::new(dir.path())).unwrap()
    }

    async fn plan(
        src: &LocalAdapter,
        dst: &LocalAdapter,
        checksum: bool,
        delete: bool,
    ) -> (Vec<EntryUpdateInfo>, Vec<RelativePath>) {
        let source_tree = walk(src).await.unwrap();
        let destination_tree = walk(dst).await.unwrap();
        MirrorPlanner {
            source: src,
            destination: dst,
            checksum,
            delete,
        }
        .plan(&source_tree, &destination_tree)
        .await
        .unwrap()
    }

    fn paths(changes: &[EntryUpdateInfo]) -> Vec<&str> {
        changes.iter().map(|c| c.relative_path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_walk_lists_whole_tree() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.txt"), b"c").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"t").unwrap();

        let tree = walk(&adapter(&dir)).await.unwrap();
        let listed: Vec<&str> = tree.items.keys().map(|p| p.as_str()).collect();
        assert_eq!(listed, vec!["a", "a/b", "a/b/c.txt", "top.txt"]);
        assert_eq!(tree.faults, 0);
    }

    #[tokio::test]
    async fn test_plan_creates_missing_items() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        std::fs::create_dir(src_dir.path().join("docs")).unwrap();
        std::fs::write(src_dir.path().join("docs/a.txt"), b"alpha").unwrap();

        let (changes, replaced) = plan(&adapter(&src_dir), &adapter(&dst_dir), false, false).await;
        assert!(replaced.is_empty());
        let ordered = order_changes(changes);
        assert_eq!(paths(&ordered), vec!["docs", "docs/a.txt"]);
        assert!(ordered[0].flags.contains(ChangeFlags::NEW_DIRECTORY));
        assert!(ordered[1].flags.contains(ChangeFlags::NEW_FILE));
    }

    #[tokio::test]
    async fn test_plan_detects_size_change_and_checksum() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        std::fs::write(dst_dir.path().join("same.txt"), b"aaaa").unwrap();
        std::fs::write(dst_dir.path().join("grown.txt"), b"a").unwrap();
        std::fs::write(src_dir.path().join("same.txt"), b"bbbb").unwrap();
        std::fs::write(src_dir.path().join("grown.txt"), b"abc").unwrap();
        let src = adapter(&src_dir);
        let dst = adapter(&dst_dir);

        let (changes, _) = plan(&src, &dst, false, false).await;
        let sized: Vec<&str> = changes
            .iter()
            .filter(|c| c.flags.contains(ChangeFlags::FILE_SIZE))
            .map(|c| c.relative_path.as_str())
            .collect();
        assert_eq!(sized, vec!["grown.txt"]);

        let (changes, _) = plan(&src, &dst, true, false).await;
        assert!(changes.iter().any(|c| c.relative_path.as_str() == "same.txt"));
    }

    #[tokio::test]
    async fn test_plan_deletes_only_with_flag() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        std::fs::create_dir(dst_dir.path().join("stale")).unwrap();
        std::fs::write(dst_dir.path().join("stale/x.txt"), b"x").unwrap();
        let src = adapter(&src_dir);
        let dst = adapter(&dst_dir);

        let (changes, _) = plan(&src, &dst, false, false).await;
        assert!(changes.is_empty());

        let (changes, _) = plan(&src, &dst, false, true).await;
        let ordered = order_changes(changes);
        assert_eq!(paths(&ordered), vec!["stale/x.txt", "stale"]);
        assert!(ordered.iter().all(|c| c.flags == ChangeFlags::DELETED));
    }

    #[tokio::test]
    async fn test_plan_reports_type_change() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        std::fs::write(src_dir.path().join("thing"), b"now a file").unwrap();
        std::fs::create_dir(dst_dir.path().join("thing")).unwrap();
        std::fs::write(dst_dir.path().join("thing/inner.txt"), b"old").unwrap();

        let (changes, replaced) =
            plan(&adapter(&src_dir), &adapter(&dst_dir), false, true).await;
        assert_eq!(replaced, vec![RelativePath::new("thing").unwrap()]);
        assert_eq!(paths(&changes), vec!["thing"]);
        assert!(changes[0].flags.contains(ChangeFlags::NEW_FILE));
    }

    #[tokio::test]
    async fn test_mirror_copies_tree() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(src_dir.path().join("a/b")).unwrap();
        std::fs::write(src_dir.path().join("a/b/deep.txt"), b"deep content").unwrap();
        std::fs::write(src_dir.path().join("root.txt"), b"root").unwrap();
        std::fs::write(dst_dir.path().join("extra.txt"), b"extra").unwrap();

        let cmd = MirrorCommand {
            source: src_dir.path().to_path_buf(),
            destination: dst_dir.path().to_path_buf(),
            delete: true,
            checksum: false,
            dry_run: false,
            record: false,
        };
        cmd.execute(&Config::default(), OutputFormat::Json)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(dst_dir.path().join("a/b/deep.txt")).unwrap(),
            b"deep content"
        );
        assert_eq!(std::fs::read(dst_dir.path().join("root.txt")).unwrap(), b"root");
        assert!(!dst_dir.path().join("extra.txt").exists());
    }

    #[tokio::test]
    async fn test_mirror_records_entries() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        std::fs::write(src_dir.path().join("f.txt"), b"data").unwrap();

        let mut config = Config::default();
        config.database.path = state.path().join("entries.db");
        let cmd = MirrorCommand {
            source: src_dir.path().to_path_buf(),
            destination: dst_dir.path().to_path_buf(),
            delete: false,
            checksum: false,
            dry_run: false,
            record: true,
        };
        cmd.execute(&config, OutputFormat::Json).await.unwrap();

        let pool = DatabasePool::new(&config.database.path).await.unwrap();
        let repo = SqliteEntryRepository::new(pool.pool().clone());
        assert_eq!(repo.count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        std::fs::write(src_dir.path().join("f.txt"), b"data").unwrap();

        let cmd = MirrorCommand {
            source: src_dir.path().to_path_buf(),
            destination: dst_dir.path().to_path_buf(),
            delete: false,
            checksum: false,
            dry_run: true,
            record: false,
        };
        cmd.execute(&Config::default(), OutputFormat::Json)
            .await
            .unwrap();
        assert!(!dst_dir.path().join("f.txt").exists());
    }
}
