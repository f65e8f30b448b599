//! Order command - Print a change batch in safe application order
//!
//! Reads a JSON array of change records from a file (or `-` for stdin):
//!
//! ```json
//! [
//!   {"path": "docs/a.txt", "flags": ["deleted"]},
//!   {"path": "docs", "flags": ["new_directory"]},
//!   {"path": "docs/b.txt", "flags": ["renamed"], "previous_path": "b.txt"}
//! ]
//! ```
//!
//! and prints the records creations first, then updates, then deletions.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use polysync_core::domain::{
    ChangeFlags, EntryType, EntryUpdateInfo, RelativePath, SyncEntry,
};
use polysync_core::usecases::{order_changes, ChangeClass};
use serde::Deserialize;
use tracing::debug;

use crate::output::{get_formatter, OutputFormat};

/// Arguments for the order subcommand
#[derive(Debug, clap::Args)]
pub struct OrderCommand {
    /// JSON file holding the change batch (`-` reads stdin)
    pub file: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChangeInput {
    path: String,
    flags: ChangeFlags,
    #[serde(default)]
    previous_path: Option<String>,
    /// Marks an existing directory; new directories are recognised by their flag
    #[serde(default)]
    directory: bool,
}

/// Parses a JSON change batch into change records
///
/// Every record hangs off one synthetic root entry; only paths and flags
/// matter for ordering.
pub fn parse_change_batch(json: &str) -> Result<Vec<EntryUpdateInfo>> {
    let inputs: Vec<ChangeInput> =
        serde_json::from_str(json).context("Failed to parse change batch")?;
    let root = SyncEntry::new_root();

    inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            let path = RelativePath::new(input.path)
                .with_context(|| format!("Invalid path in record {}", index + 1))?;
            let Some(name) = path.file_name() else {
                bail!("Record {} targets the synchronized root", index + 1);
            };
            let entry_type = if input.directory || input.flags.contains(ChangeFlags::NEW_DIRECTORY)
            {
                EntryType::Directory
            } else {
                EntryType::File
            };
            let entry = SyncEntry::new_child(root.id(), name, entry_type)?;

            let mut update = EntryUpdateInfo::new(entry, path, input.flags);
            if let Some(previous) = input.previous_path {
                let previous = RelativePath::new(previous).with_context(|| {
                    format!("Invalid previous_path in record {}", index + 1)
                })?;
                update = update.with_previous_path(previous);
            }
            Ok(update)
        })
        .collect()
}

fn class_name(flags: ChangeFlags) -> &'static str {
    match ChangeClass::of(flags) {
        ChangeClass::Creation => "creation",
        ChangeClass::Update => "update",
        ChangeClass::Deletion => "deletion",
    }
}

impl OrderCommand {
    /// Execute the order command
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let json = if self.file.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read change batch from stdin")?;
            buf
        } else {
            std::fs::read_to_string(&self.file)
                .with_context(|| format!("Failed to read {}", self.file.display()))?
        };

        let ordered = order_changes(parse_change_batch(&json)?);
        debug!(records = ordered.len(), "Change batch ordered");

        if format.is_json() {
            let records: Vec<serde_json::Value> = ordered
                .iter()
                .map(|update| {
                    serde_json::json!({
                        "path": update.relative_path.as_str(),
                        "flags": update.flags.names(),
                        "class": class_name(update.flags),
                        "previous_path": update.previous_path.as_ref().map(|p| p.as_str()),
                    })
                })
                .collect();
            formatter.print_json(&serde_json::Value::Array(records));
            return Ok(());
        }

        formatter.success(&format!("{} change(s) in application order", ordered.len()));
        for (index, update) in ordered.iter().enumerate() {
            let detail = match &update.previous_path {
                Some(previous) => format!("{} (from {})", update.flags, previous),
                None => update.flags.to_string(),
            };
            formatter.row(
                &(index + 1).to_string(),
                update.relative_path.as_str(),
                &detail,
            );
        }
        Ok(())
    }
}
