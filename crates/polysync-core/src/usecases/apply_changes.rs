//! Apply use case
//!
//! Executes an ordered batch of change records from a source adapter to a
//! destination adapter, strictly one record at a time. Every record gets
//! its own [`EntryOutcome`]; one failure never aborts the batch, except
//! that an unrecoverable fault (contract violation, authentication still
//! rejected after a refresh) skips everything that follows.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::{
    ChangeFlags, EntryUpdateInfo, RelativePath, Side, SyncEntry, SyncFault,
};
use crate::ports::{IAdapter, IEntryRepository, IReadStream, IWriteStream};

use super::order_changes::{order_changes, ChangeClass};

/// Default size of the buffer used to pump bytes from reader to writer
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Flags whose change requires the content to be transferred again
const CONTENT_FLAGS: ChangeFlags = ChangeFlags::from_bits_truncate(
    ChangeFlags::FILE_SIZE.bits()
        | ChangeFlags::SHA1_HASH.bits()
        | ChangeFlags::MD5_HASH.bits()
        | ChangeFlags::MODIFIED_TIMESTAMP.bits(),
);

/// Result of applying one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    /// The change was carried out
    Applied,
    /// The change failed; other records were unaffected
    Failed {
        /// Short fault code, see [`SyncFault::code`]
        code: String,
        /// Fault description
        message: String,
    },
    /// Not attempted because an earlier record hit an unrecoverable fault
    Skipped,
}

/// Per-record outcome
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    /// Path of the record
    pub relative_path: RelativePath,
    /// Flags of the record
    pub flags: ChangeFlags,
    /// What happened
    pub status: EntryStatus,
    /// The entry after the change was applied (unchanged on failure)
    pub entry: SyncEntry,
}

/// Outcomes of one pass, in application order
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// One outcome per record
    pub outcomes: Vec<EntryOutcome>,
}

impl ApplyReport {
    /// Number of applied records
    pub fn applied(&self) -> usize {
        self.count(|status| matches!(status, EntryStatus::Applied))
    }

    /// Number of failed records
    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, EntryStatus::Failed { .. }))
    }

    /// Number of skipped records
    pub fn skipped(&self) -> usize {
        self.count(|status| matches!(status, EntryStatus::Skipped))
    }

    fn count(&self, predicate: impl Fn(&EntryStatus) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| predicate(&outcome.status))
            .count()
    }
}

/// Use case applying a change batch between two adapters
pub struct ApplyChangesUseCase {
    source: Arc<dyn IAdapter>,
    destination: Arc<dyn IAdapter>,
    repository: Option<Arc<dyn IEntryRepository>>,
    copy_buffer_size: usize,
}

impl ApplyChangesUseCase {
    /// Creates a new ApplyChangesUseCase
    pub fn new(source: Arc<dyn IAdapter>, destination: Arc<dyn IAdapter>) -> Self {
        Self {
            source,
            destination,
            repository: None,
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
        }
    }

    /// Persists every successfully applied entry through `repository`
    pub fn with_repository(mut self, repository: Arc<dyn IEntryRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Overrides the copy buffer size (minimum 1 byte)
    pub fn with_copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size.max(1);
        self
    }

    /// Orders and applies `changes`
    pub async fn execute(&self, changes: Vec<EntryUpdateInfo>) -> ApplyReport {
        let ordered = order_changes(changes);
        let total = ordered.len();
        info!(
            total,
            source = %self.source.adapter_id(),
            destination = %self.destination.adapter_id(),
            "Applying change batch"
        );

        let mut report = ApplyReport::default();
        let mut halted = false;

        for mut update in ordered {
            if halted {
                report.outcomes.push(outcome(update, EntryStatus::Skipped));
                continue;
            }

            let status = match self.apply_one(&mut update).await {
                Ok(()) => match self.persist(&update.entry).await {
                    Ok(()) => EntryStatus::Applied,
                    Err(e) => {
                        error!(path = %update.relative_path, error = %e, "Failed to persist entry");
                        EntryStatus::Failed {
                            code: "PERSISTENCE".to_string(),
                            message: format!("{e:#}"),
                        }
                    }
                },
                Err(fault) => {
                    if fault.is_unrecoverable() {
                        error!(
                            path = %update.relative_path,
                            code = fault.code(),
                            error = %fault,
                            "Unrecoverable fault, skipping the rest of the pass"
                        );
                        halted = true;
                    } else {
                        warn!(
                            path = %update.relative_path,
                            code = fault.code(),
                            error = %fault,
                            "Change failed"
                        );
                    }
                    EntryStatus::Failed {
                        code: fault.code().to_string(),
                        message: fault.to_string(),
                    }
                }
            };
            report.outcomes.push(outcome(update, status));
        }

        info!(
            applied = report.applied(),
            failed = report.failed(),
            skipped = report.skipped(),
            "Change batch finished"
        );
        report
    }

    async fn apply_one(&self, update: &mut EntryUpdateInfo) -> Result<(), SyncFault> {
        debug!(path = %update.relative_path, flags = %update.flags, "Applying change");

        match ChangeClass::of(update.flags) {
            ChangeClass::Creation => {
                if update.entry.is_directory() {
                    self.create_directory(update).await?;
                } else {
                    self.copy_file(update).await?;
                }
                update.entry.restore();
            }
            ChangeClass::Deletion => {
                self.destination.delete_item(update).await?;
                update.entry.mark_deleted();
            }
            ChangeClass::Update => {
                let renamed = update.flags.contains(ChangeFlags::RENAMED);
                if update.entry.is_directory() {
                    if renamed {
                        self.create_directory(update).await?;
                    }
                } else if renamed || update.flags.intersects(CONTENT_FLAGS) {
                    self.copy_file(update).await?;
                } else {
                    debug!(path = %update.relative_path, "Metadata-only change recorded");
                }
                if renamed {
                    self.delete_previous(update).await?;
                }
            }
        }
        Ok(())
    }

    async fn create_directory(&self, update: &mut EntryUpdateInfo) -> Result<(), SyncFault> {
        let item_id = self.destination.create_directory(update).await?;
        update
            .entry
            .upsert_adapter_entry(self.destination.adapter_id(), item_id);
        Ok(())
    }

    /// Removes the destination copy left at the pre-rename path
    async fn delete_previous(&self, update: &EntryUpdateInfo) -> Result<(), SyncFault> {
        let Some(previous) = update.previous_path.clone() else {
            return Ok(());
        };
        if previous == update.relative_path {
            return Ok(());
        }
        let stale = EntryUpdateInfo::new(update.entry.clone(), previous, ChangeFlags::DELETED);
        self.destination.delete_item(&stale).await
    }

    async fn copy_file(&self, update: &mut EntryUpdateInfo) -> Result<(), SyncFault> {
        let expected = update.entry.size(Side::Source);
        let mut reader = self.source.open_read_stream(update).await?;
        let mut writer = self.destination.open_write_stream(update, expected).await?;

        let pumped = pump(
            reader.as_mut(),
            writer.as_mut(),
            expected,
            self.copy_buffer_size,
        )
        .await;

        if let Err(fault) = pumped {
            if let Err(abort_fault) = writer.abort().await {
                warn!(
                    path = %update.relative_path,
                    error = %abort_fault,
                    "Failed to abort write handle"
                );
            }
            return Err(fault);
        }

        let committed = self.destination.finalize_write(writer, update).await?;
        update.entry.set_size(Side::Source, expected);
        update.entry.set_size(Side::Destination, committed.size);
        if let Some(hash) = committed.hash {
            update.entry.set_hash(hash);
        }
        if let Some(source_id) = update.entry.item_id(self.source.adapter_id()).cloned() {
            update
                .entry
                .upsert_adapter_entry(self.source.adapter_id(), source_id);
        }
        debug!(path = %update.relative_path, bytes = committed.size, "File copied");
        Ok(())
    }

    async fn persist(&self, entry: &SyncEntry) -> anyhow::Result<()> {
        match &self.repository {
            Some(repository) => repository.save_entry(entry).await,
            None => Ok(()),
        }
    }
}

fn outcome(update: EntryUpdateInfo, status: EntryStatus) -> EntryOutcome {
    EntryOutcome {
        relative_path: update.relative_path,
        flags: update.flags,
        status,
        entry: update.entry,
    }
}

/// Copies all bytes of `reader` into `writer`
///
/// A source that produces more than `expected` bytes is a size mismatch; it
/// is caught before the extra bytes reach the writer.
async fn pump(
    reader: &mut dyn IReadStream,
    writer: &mut dyn IWriteStream,
    expected: u64,
    buffer_size: usize,
) -> Result<(), SyncFault> {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let total = writer.bytes_written() + n as u64;
        if total > expected {
            return Err(SyncFault::SizeMismatch {
                declared: expected,
                actual: total,
            });
        }
        writer.write(&buf[..n]).await?;
    }
    writer.flush().await
}
