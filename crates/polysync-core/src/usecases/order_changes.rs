//! Diff ordering
//!
//! Turns an unordered batch of change records into a sequence that is safe
//! to apply one record at a time:
//!
//! 1. Creations (new files, new directories, restores) first, shallow paths
//!    before deep ones, ties broken by path. A directory therefore exists
//!    before anything is created inside it.
//! 2. Attribute-only updates and renames next, by path.
//! 3. Deletions last, in descending path order. A path sorts after every
//!    one of its ancestors, so children are removed before their parents.
//!
//! This is not a dependency-graph sort. It relies on the batch coming from
//! a tree, where a child's path always has its parent's path as a strict
//! prefix. Paths compare component by component, so `a\b` and `a/b` are
//! the same path.

use std::cmp::Ordering;

use crate::domain::{ChangeFlags, EntryUpdateInfo};

/// Precedence class of a change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeClass {
    /// Brings an item into existence
    Creation,
    /// Timestamp, size, hash or name change
    Update,
    /// Removes an item
    Deletion,
}

impl ChangeClass {
    /// Classifies a set of flags; a record that is both a creation and a
    /// deletion counts as a creation
    pub fn of(flags: ChangeFlags) -> Self {
        if flags.is_creation() {
            ChangeClass::Creation
        } else if flags.is_deletion() {
            ChangeClass::Deletion
        } else {
            ChangeClass::Update
        }
    }
}

/// Total order used by [`order_changes`]
pub fn compare_changes(a: &EntryUpdateInfo, b: &EntryUpdateInfo) -> Ordering {
    let class_a = ChangeClass::of(a.flags);
    let class_b = ChangeClass::of(b.flags);

    class_a.cmp(&class_b).then_with(|| match class_a {
        ChangeClass::Creation => a
            .depth()
            .cmp(&b.depth())
            .then_with(|| a.relative_path.cmp(&b.relative_path)),
        ChangeClass::Update => a.relative_path.cmp(&b.relative_path),
        ChangeClass::Deletion => b.relative_path.cmp(&a.relative_path),
    })
}

/// Orders a batch of change records for sequential application
pub fn order_changes(mut changes: Vec<EntryUpdateInfo>) -> Vec<EntryUpdateInfo> {
    changes.sort_by(compare_changes);
    changes
}
