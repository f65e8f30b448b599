//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`IAdapter`] over a directory tree using `tokio::fs`.
//!
//! ## Design Decisions
//!
//! - **Item ids**: `(device, inode)` on Unix, so a renamed file keeps its
//!   id; elsewhere the SHA-1 of the relative path.
//! - **Atomic writes**: content goes to a hidden sibling temp file that is
//!   renamed over the target on commit and removed on abort.
//! - **Path index**: items handed out by `root`/`enumerate_children` are
//!   remembered by id so later calls that only receive an [`AdapterItem`]
//!   can find them on disk.
//! - **Hashes**: SHA-1 and MD5 are computed by streaming the file; they are
//!   never read during enumeration.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use polysync_core::domain::{
    compare_attributes, AdapterId, AdapterItem, AdapterTypeId, ChangeDetection, ContentHash,
    EntryUpdateInfo, HashKind, ItemId, RelativePath, Side, SyncEntry, SyncFault,
};
use polysync_core::ports::{
    AdapterCapabilities, CommittedItem, Enumeration, IAdapter, IPushNotifiable, IReadStream,
    IWriteStream, ItemFault,
};
use polysync_transfer::ContentHasher;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::watcher::ChangeWatcher;
use crate::{lock, LocalAdapterConfig, LOCAL_ADAPTER_TYPE};

const TEMP_PREFIX: &str = ".polysync-";
const TEMP_SUFFIX: &str = ".partial";
const HASH_BUFFER_SIZE: usize = 64 * 1024;

type PathIndex = Arc<Mutex<HashMap<ItemId, RelativePath>>>;

/// True for the adapter's own in-flight temporary files
pub(crate) fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

#[cfg(unix)]
fn item_id_for(_relative: &RelativePath, metadata: &std::fs::Metadata) -> Result<ItemId, SyncFault> {
    use std::os::unix::fs::MetadataExt;
    ItemId::new(format!("{:x}:{:x}", metadata.dev(), metadata.ino()))
        .map_err(|e| SyncFault::contract(e.to_string()))
}

#[cfg(not(unix))]
fn item_id_for(relative: &RelativePath, _metadata: &std::fs::Metadata) -> Result<ItemId, SyncFault> {
    let hash = polysync_transfer::compute_hash(HashKind::Sha1, relative.as_str().as_bytes());
    ItemId::new(hash.to_hex()).map_err(|e| SyncFault::contract(e.to_string()))
}

fn unsupported(message: &str) -> SyncFault {
    SyncFault::Io(std::io::Error::new(ErrorKind::Unsupported, message.to_string()))
}

// ============================================================================
// LocalAdapter
// ============================================================================

/// Adapter that bridges the [`IAdapter`] port to a local directory
pub struct LocalAdapter {
    id: AdapterId,
    root: PathBuf,
    index: PathIndex,
    watcher: ChangeWatcher,
}

impl LocalAdapter {
    /// Creates an adapter rooted at `config.root`
    ///
    /// # Errors
    /// Returns error if the root does not exist or is not a directory
    pub fn new(id: AdapterId, config: LocalAdapterConfig) -> anyhow::Result<Self> {
        let metadata = std::fs::metadata(&config.root)
            .with_context(|| format!("Cannot access adapter root {}", config.root.display()))?;
        if !metadata.is_dir() {
            anyhow::bail!("Adapter root {} is not a directory", config.root.display());
        }

        debug!(adapter_id = %id, root = %config.root.display(), "Local adapter created");
        Ok(Self {
            id,
            watcher: ChangeWatcher::new(
                config.root.clone(),
                Duration::from_secs(config.poll_interval_secs),
            ),
            root: config.root,
            index: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Directory the adapter is rooted at
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a root-relative path
    pub fn resolve(&self, relative: &RelativePath) -> PathBuf {
        relative
            .components()
            .fold(self.root.clone(), |path, component| path.join(component))
    }

    fn path_for(&self, item_id: &ItemId) -> Result<RelativePath, SyncFault> {
        lock(&self.index).get(item_id).cloned().ok_or_else(|| {
            SyncFault::contract(format!("item {item_id} was not produced by this adapter"))
        })
    }

    fn item_from_metadata(
        &self,
        relative: &RelativePath,
        name: &str,
        metadata: &std::fs::Metadata,
        parent_id: Option<ItemId>,
    ) -> Result<AdapterItem, SyncFault> {
        let item_id = item_id_for(relative, metadata)?;
        let created = metadata.created().ok().map(DateTime::<Utc>::from);
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        let item = if metadata.is_dir() {
            AdapterItem::directory(self.id, item_id.clone(), name, parent_id)
        } else {
            AdapterItem::file(self.id, item_id.clone(), name, metadata.len(), parent_id)
        }
        .with_timestamps(created, modified);

        lock(&self.index).insert(item_id, relative.clone());
        Ok(item)
    }

    async fn inspect_child(
        &self,
        folder: &RelativePath,
        folder_id: &ItemId,
        name: &str,
        dir_entry: &tokio::fs::DirEntry,
    ) -> Result<AdapterItem, SyncFault> {
        let relative = folder
            .join(name)
            .map_err(|e| SyncFault::contract(e.to_string()))?;
        let metadata = dir_entry.metadata().await?;
        if metadata.file_type().is_symlink() {
            return Err(unsupported("symbolic links are not synchronized"));
        }
        self.item_from_metadata(&relative, name, &metadata, Some(folder_id.clone()))
    }
}

impl std::fmt::Debug for LocalAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAdapter")
            .field("id", &self.id)
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl IAdapter for LocalAdapter {
    fn adapter_id(&self) -> AdapterId {
        self.id
    }

    fn adapter_type(&self) -> AdapterTypeId {
        LOCAL_ADAPTER_TYPE
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            push_notifications: true,
            ..AdapterCapabilities::default()
        }
    }

    async fn root(&self) -> Result<AdapterItem, SyncFault> {
        let metadata = tokio::fs::metadata(&self.root).await?;
        self.item_from_metadata(&RelativePath::root(), "", &metadata, None)
    }

    #[instrument(skip(self, folder), fields(folder = %folder.name))]
    async fn enumerate_children(&self, folder: &AdapterItem) -> Result<Enumeration, SyncFault> {
        if !folder.is_directory() {
            return Err(SyncFault::contract(format!(
                "cannot enumerate file {}",
                folder.name
            )));
        }
        let relative = self.path_for(&folder.item_id)?;
        let mut reader = tokio::fs::read_dir(self.resolve(&relative)).await?;
        let mut enumeration = Enumeration::default();

        while let Some(dir_entry) = reader.next_entry().await? {
            let os_name = dir_entry.file_name();
            let Some(name) = os_name.to_str() else {
                let name = os_name.to_string_lossy().into_owned();
                warn!(name = %name, "Skipping child with a non UTF-8 name");
                enumeration.faults.push(ItemFault {
                    name,
                    fault: SyncFault::Io(std::io::Error::new(
                        ErrorKind::InvalidData,
                        "name is not valid UTF-8",
                    )),
                });
                continue;
            };
            if is_temp_name(name) {
                continue;
            }

            match self
                .inspect_child(&relative, &folder.item_id, name, &dir_entry)
                .await
            {
                Ok(item) => enumeration.items.push(item),
                Err(fault) => {
                    warn!(name, error = %fault, "Failed to inspect child");
                    enumeration.faults.push(ItemFault {
                        name: name.to_string(),
                        fault,
                    });
                }
            }
        }

        enumeration.items.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(
            items = enumeration.items.len(),
            faults = enumeration.faults.len(),
            "Folder enumerated"
        );
        Ok(enumeration)
    }

    #[instrument(skip(self, update), fields(path = %update.relative_path))]
    async fn open_read_stream(
        &self,
        update: &EntryUpdateInfo,
    ) -> Result<Box<dyn IReadStream>, SyncFault> {
        let path = self.resolve(&update.relative_path);
        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.is_dir() {
            return Err(SyncFault::contract(format!(
                "cannot read directory {}",
                update.relative_path
            )));
        }
        let file = File::open(&path).await?;
        debug!(size = metadata.len(), "Opened read stream");
        Ok(Box::new(LocalReadStream { file }))
    }

    #[instrument(skip(self, update), fields(path = %update.relative_path))]
    async fn open_write_stream(
        &self,
        update: &EntryUpdateInfo,
        expected_length: u64,
    ) -> Result<Box<dyn IWriteStream>, SyncFault> {
        let name = update
            .relative_path
            .file_name()
            .ok_or_else(|| SyncFault::contract("cannot write to the adapter root"))?;
        let target_path = self.resolve(&update.relative_path);
        let parent = target_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&parent).await?;

        let temp_path = parent.join(format!(
            "{TEMP_PREFIX}{name}.{}{TEMP_SUFFIX}",
            update.entry.id()
        ));
        let file = File::create(&temp_path).await?;
        debug!(temp = %temp_path.display(), expected_length, "Opened write stream");

        Ok(Box::new(LocalWriteStream {
            file,
            temp_path,
            target_path,
            relative_path: update.relative_path.clone(),
            written: 0,
            expected_length,
            hasher: ContentHasher::new(HashKind::Sha1),
            index: Arc::clone(&self.index),
        }))
    }

    #[instrument(skip(self, update), fields(path = %update.relative_path))]
    async fn create_directory(&self, update: &EntryUpdateInfo) -> Result<ItemId, SyncFault> {
        let path = self.resolve(&update.relative_path);
        tokio::fs::create_dir_all(&path).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        let item_id = item_id_for(&update.relative_path, &metadata)?;
        lock(&self.index).insert(item_id.clone(), update.relative_path.clone());
        debug!(item_id = %item_id, "Directory created");
        Ok(item_id)
    }

    #[instrument(skip(self, update), fields(path = %update.relative_path))]
    async fn delete_item(&self, update: &EntryUpdateInfo) -> Result<(), SyncFault> {
        if update.relative_path.is_root() {
            return Err(SyncFault::contract("cannot delete the adapter root"));
        }
        let path = self.resolve(&update.relative_path);
        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Already absent");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }

        let removed = &update.relative_path;
        lock(&self.index).retain(|_, known| known != removed && !removed.is_ancestor_of(known));
        debug!("Item deleted");
        Ok(())
    }

    fn detect_change(&self, known: &SyncEntry, live: &AdapterItem, side: Side) -> ChangeDetection {
        compare_attributes(known, live, side)
    }

    #[instrument(skip(self, item), fields(item = %item.name, kind = %kind))]
    async fn compute_hash(
        &self,
        kind: HashKind,
        item: &AdapterItem,
    ) -> Result<Option<ContentHash>, SyncFault> {
        if item.is_directory() {
            return Ok(None);
        }
        let relative = self.path_for(&item.item_id)?;
        let mut file = File::open(self.resolve(&relative)).await?;
        let mut hasher = ContentHasher::new(kind);
        let mut buf = vec![0u8; HASH_BUFFER_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        debug!(bytes = hasher.bytes_hashed(), "Hash computed");
        Ok(Some(hasher.finalize()))
    }

    fn as_push_notifiable(&self) -> Option<&dyn IPushNotifiable> {
        Some(&self.watcher)
    }
}

// ============================================================================
// Stream handles
// ============================================================================

/// Forward-only reader over a local file
pub struct LocalReadStream {
    file: File,
}

#[async_trait]
impl IReadStream for LocalReadStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SyncFault> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// Writer into a temporary sibling file, renamed over the target on commit
pub struct LocalWriteStream {
    file: File,
    temp_path: PathBuf,
    target_path: PathBuf,
    relative_path: RelativePath,
    written: u64,
    expected_length: u64,
    hasher: ContentHasher,
    index: PathIndex,
}

async fn discard(temp_path: &Path) {
    match tokio::fs::remove_file(temp_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(temp = %temp_path.display(), error = %e, "Failed to remove temp file"),
    }
}

/// Makes the temp file durable and moves it over the target
async fn publish(mut file: File, temp_path: &Path, target_path: &Path) -> std::io::Result<()> {
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(temp_path, target_path).await
}

#[async_trait]
impl IWriteStream for LocalWriteStream {
    async fn write(&mut self, data: &[u8]) -> Result<(), SyncFault> {
        if self.written + data.len() as u64 > self.expected_length {
            return Err(SyncFault::contract(format!(
                "write of {} bytes exceeds the declared length ({} of {} bytes already written)",
                data.len(),
                self.written,
                self.expected_length
            )));
        }
        self.file.write_all(data).await?;
        self.hasher.update(data);
        self.written += data.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SyncFault> {
        self.file.flush().await?;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }

    fn expected_length(&self) -> u64 {
        self.expected_length
    }

    async fn commit(self: Box<Self>) -> Result<CommittedItem, SyncFault> {
        let LocalWriteStream {
            file,
            temp_path,
            target_path,
            relative_path,
            written,
            expected_length,
            hasher,
            index,
        } = *self;

        if written != expected_length {
            drop(file);
            discard(&temp_path).await;
            return Err(SyncFault::SizeMismatch {
                declared: expected_length,
                actual: written,
            });
        }

        if let Err(e) = publish(file, &temp_path, &target_path).await {
            warn!(path = %relative_path, error = %e, "Commit failed, removing temp file");
            discard(&temp_path).await;
            return Err(e.into());
        }

        let metadata = tokio::fs::metadata(&target_path).await?;
        let item_id = item_id_for(&relative_path, &metadata)?;
        lock(&index).insert(item_id.clone(), relative_path.clone());
        info!(path = %relative_path, item_id = %item_id, size = written, "File committed");

        Ok(CommittedItem {
            item_id,
            size: written,
            hash: Some(hasher.finalize()),
        })
    }

    async fn abort(self: Box<Self>) -> Result<(), SyncFault> {
        let LocalWriteStream {
            file,
            temp_path,
            relative_path,
            written,
            ..
        } = *self;
        drop(file);
        discard(&temp_path).await;
        warn!(path = %relative_path, written, "Write aborted");
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================
