//! Change records produced by comparing two observations of an entry
//!
//! [`ChangeFlags`] is a small bitset; several flags may be set on the same
//! record (a file can be renamed and resized in one pass). An
//! [`EntryUpdateInfo`] ties the flags to the entry and its relative path and
//! lives only for the duration of one synchronization pass.

use std::fmt::{self, Display, Formatter};
use std::ops::{BitOr, BitOrAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{EntryType, Side, SyncEntry};
use super::errors::DomainError;
use super::item::AdapterItem;
use super::newtypes::{HashKind, RelativePath};

// ============================================================================
// ChangeFlags
// ============================================================================

/// Bitset describing which attributes of an entry differ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ChangeFlags(u32);

impl ChangeFlags {
    /// No change
    pub const NONE: Self = Self(0);
    /// A file appeared
    pub const NEW_FILE: Self = Self(1 << 0);
    /// A directory appeared
    pub const NEW_DIRECTORY: Self = Self(1 << 1);
    /// Creation timestamp differs
    pub const CREATED_TIMESTAMP: Self = Self(1 << 2);
    /// Modification timestamp differs
    pub const MODIFIED_TIMESTAMP: Self = Self(1 << 3);
    /// Size differs
    pub const FILE_SIZE: Self = Self(1 << 4);
    /// SHA-1 differs
    pub const SHA1_HASH: Self = Self(1 << 5);
    /// MD5 differs
    pub const MD5_HASH: Self = Self(1 << 6);
    /// Name differs
    pub const RENAMED: Self = Self(1 << 7);
    /// The item disappeared
    pub const DELETED: Self = Self(1 << 8);
    /// A previously deleted item reappeared
    pub const RESTORED: Self = Self(1 << 9);

    const NAMED: [(Self, &'static str); 10] = [
        (Self::NEW_FILE, "new_file"),
        (Self::NEW_DIRECTORY, "new_directory"),
        (Self::CREATED_TIMESTAMP, "created_timestamp"),
        (Self::MODIFIED_TIMESTAMP, "modified_timestamp"),
        (Self::FILE_SIZE, "file_size"),
        (Self::SHA1_HASH, "sha1_hash"),
        (Self::MD5_HASH, "md5_hash"),
        (Self::RENAMED, "renamed"),
        (Self::DELETED, "deleted"),
        (Self::RESTORED, "restored"),
    ];

    /// Every non-structural attribute flag
    pub const fn all_attributes() -> Self {
        Self(
            Self::CREATED_TIMESTAMP.0
                | Self::MODIFIED_TIMESTAMP.0
                | Self::FILE_SIZE.0
                | Self::SHA1_HASH.0
                | Self::MD5_HASH.0,
        )
    }

    /// Raw bit value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Builds flags from raw bits, dropping unknown bits
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & ((1 << 10) - 1))
    }

    /// Returns true if every flag in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any flag in `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Sets the flags in `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the flags in `other`
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Returns true if no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// A creation brings an item into existence (new file, new directory, restore)
    pub const fn is_creation(self) -> bool {
        self.intersects(Self(
            Self::NEW_FILE.0 | Self::NEW_DIRECTORY.0 | Self::RESTORED.0,
        ))
    }

    /// A deletion removes an item; a record that is also a creation is not one
    pub const fn is_deletion(self) -> bool {
        self.contains(Self::DELETED) && !self.is_creation()
    }

    /// Snake-case names of the set flags, in bit order
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Parses a single flag name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(flag, _)| *flag)
    }
}

impl BitOr for ChangeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Display for ChangeFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.names().join("|"))
    }
}

impl TryFrom<Vec<String>> for ChangeFlags {
    type Error = DomainError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        names.iter().try_fold(Self::NONE, |acc, name| {
            Self::from_name(name)
                .map(|flag| acc | flag)
                .ok_or_else(|| DomainError::ValidationFailed(format!("Unknown change flag: {name}")))
        })
    }
}

impl From<ChangeFlags> for Vec<String> {
    fn from(flags: ChangeFlags) -> Self {
        flags.names().into_iter().map(String::from).collect()
    }
}

// ============================================================================
// EntryUpdateInfo
// ============================================================================

/// A change record for one entry within one synchronization pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdateInfo {
    /// The entry the change applies to
    pub entry: SyncEntry,
    /// Path of the entry relative to the synchronized root
    pub relative_path: RelativePath,
    /// What changed
    pub flags: ChangeFlags,
    /// Former path, set when the record carries [`ChangeFlags::RENAMED`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<RelativePath>,
}

impl EntryUpdateInfo {
    /// Creates a new change record
    pub fn new(entry: SyncEntry, relative_path: RelativePath, flags: ChangeFlags) -> Self {
        Self {
            entry,
            relative_path,
            flags,
            previous_path: None,
        }
    }

    /// Records the path the entry was renamed from
    pub fn with_previous_path(mut self, previous: RelativePath) -> Self {
        self.previous_path = Some(previous);
        self
    }

    /// Depth of the record's path
    pub fn depth(&self) -> usize {
        self.relative_path.depth()
    }
}

// ============================================================================
// Change detection
// ============================================================================

/// Result of comparing a known entry against a live item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeDetection {
    /// True if anything differs
    pub changed: bool,
    /// The differing attributes
    pub flags: ChangeFlags,
    /// True if the live item cannot be the same item (file became a
    /// directory or vice versa); the caller replaces the entry instead of
    /// updating it
    pub replaces_identity: bool,
}

impl ChangeDetection {
    /// Nothing differs
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Builds a detection result from a set of flags
    pub fn from_flags(flags: ChangeFlags) -> Self {
        Self {
            changed: !flags.is_empty(),
            flags,
            replaces_identity: false,
        }
    }

    /// The item is gone on the observed side
    pub fn deleted() -> Self {
        Self::from_flags(ChangeFlags::DELETED)
    }

    /// The item is new on the observed side
    pub fn created(entry_type: EntryType) -> Self {
        Self::from_flags(match entry_type {
            EntryType::File => ChangeFlags::NEW_FILE,
            EntryType::Directory => ChangeFlags::NEW_DIRECTORY,
        })
    }
}

fn same_second(known: DateTime<Utc>, live: DateTime<Utc>) -> bool {
    known.timestamp() == live.timestamp()
}

/// Compares a known entry with a live item, attribute by attribute
///
/// Pure and allocation-free; adapters implement `detect_change` on top of it.
/// Timestamps are compared at whole-second precision since backends store
/// them with different resolutions. A hash that only one side knows is not
/// a change: an unavailable hash is never a mismatch.
pub fn compare_attributes(known: &SyncEntry, live: &AdapterItem, side: Side) -> ChangeDetection {
    if known.entry_type() != live.entry_type {
        let mut detection = ChangeDetection::created(live.entry_type);
        detection.replaces_identity = true;
        return detection;
    }

    let mut flags = ChangeFlags::NONE;

    if known.is_deleted() {
        flags |= ChangeFlags::RESTORED;
    }
    if !known.is_root() && known.name() != live.name {
        flags |= ChangeFlags::RENAMED;
    }
    if let Some(created) = live.created_at {
        if !same_second(known.created_at(), created) {
            flags |= ChangeFlags::CREATED_TIMESTAMP;
        }
    }

    if live.entry_type == EntryType::File {
        if let Some(modified) = live.modified_at {
            if !same_second(known.modified_at(), modified) {
                flags |= ChangeFlags::MODIFIED_TIMESTAMP;
            }
        }
        if known.size(side) != live.size {
            flags |= ChangeFlags::FILE_SIZE;
        }
        for (kind, flag) in [
            (HashKind::Sha1, ChangeFlags::SHA1_HASH),
            (HashKind::Md5, ChangeFlags::MD5_HASH),
        ] {
            if let (Some(stored), Some(observed)) = (known.hash(kind), live.hash(kind)) {
                if stored != observed {
                    flags |= flag;
                }
            }
        }
    }

    ChangeDetection::from_flags(flags)
}
