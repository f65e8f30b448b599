//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Identifier for SyncEntry entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new random EntryId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an EntryId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid EntryId: {e}")))
    }
}

impl From<Uuid> for EntryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier of one configured adapter instance (e.g. "the NAS share",
/// "the photos bucket")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterId(Uuid);

impl AdapterId {
    /// Create a new random AdapterId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an AdapterId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AdapterId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AdapterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AdapterId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid AdapterId: {e}")))
    }
}

impl From<Uuid> for AdapterId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Stable identifier of an adapter *implementation* (local filesystem,
/// object store, ...), used as the registry key
///
/// Unlike [`AdapterId`] this is never generated at runtime: each adapter
/// implementation declares a fixed UUID constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterTypeId(Uuid);

impl AdapterTypeId {
    /// Create an AdapterTypeId from a UUID constant
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create an AdapterTypeId from a 128-bit constant
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for AdapterTypeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AdapterTypeId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid AdapterTypeId: {e}")))
    }
}

// ============================================================================
// Provider-specific identity
// ============================================================================

/// Provider-specific identifier of one backend item
///
/// Opaque to the engine. Unique within one adapter and stable for the
/// lifetime of the item; a different id means a different item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Maximum length of an item id in bytes
    pub const MAX_LEN: usize = 128;

    /// Create a new ItemId
    ///
    /// # Errors
    /// Returns error if the id is empty or longer than [`ItemId::MAX_LEN`] bytes
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidItemId(
                "Item ID cannot be empty".to_string(),
            ));
        }
        if id.len() > Self::MAX_LEN {
            return Err(DomainError::InvalidItemId(format!(
                "Item ID is {} bytes, maximum is {}",
                id.len(),
                Self::MAX_LEN
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

/// Opaque change-tracking cursor handed out by a backend's delta API
///
/// Round-trips through persisted configuration between passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeltaCursor(String);

impl DeltaCursor {
    /// Create a new DeltaCursor
    ///
    /// # Errors
    /// Returns error if the cursor is empty
    pub fn new(cursor: impl Into<String>) -> Result<Self, DomainError> {
        let cursor = cursor.into();
        if cursor.trim().is_empty() {
            return Err(DomainError::InvalidDeltaCursor(
                "Delta cursor cannot be empty".to_string(),
            ));
        }
        Ok(Self(cursor))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeltaCursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DeltaCursor {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DeltaCursor> for String {
    fn from(cursor: DeltaCursor) -> Self {
        cursor.0
    }
}

// ============================================================================
// Relative paths
// ============================================================================

/// Path of an entry relative to the synchronized root
///
/// Both `/` and `\` are accepted as separators so change batches produced
/// on either platform convention compare consistently. The original text
/// is preserved for display; equality, hashing and ordering work on the
/// component list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Create a new RelativePath
    ///
    /// Leading and trailing separators are stripped. The empty path denotes
    /// the root itself.
    ///
    /// # Errors
    /// Returns error if the path contains empty, `.` or `..` components
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();
        let trimmed = path.trim_matches(|c| c == '/' || c == '\\');

        if !trimmed.is_empty() {
            for component in trimmed.split(['/', '\\']) {
                if component.is_empty() {
                    return Err(DomainError::InvalidPath(format!(
                        "Path contains an empty component: {path}"
                    )));
                }
                if component == "." || component == ".." {
                    return Err(DomainError::InvalidPath(format!(
                        "Path must not contain '.' or '..': {path}"
                    )));
                }
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The path of the synchronized root
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Get the path as originally written (minus outer separators)
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the root path
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the path components
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(['/', '\\']).filter(|c| !c.is_empty())
    }

    /// Nesting depth: 0 for a top-level item, one more per separator
    ///
    /// The root itself also reports 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.components().count().saturating_sub(1)
    }

    /// Last component of the path, if any
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.components().last()
    }

    /// Parent path, or `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(['/', '\\']) {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Append a single component using `/`
    ///
    /// # Errors
    /// Returns error if `name` is not a valid single component
    pub fn join(&self, name: &str) -> Result<Self, DomainError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(DomainError::InvalidPath(format!(
                "Invalid path component: {name}"
            )));
        }
        if self.is_root() {
            Ok(Self(name.to_string()))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// Returns true if `self` is a strict ancestor of `other`
    #[must_use]
    pub fn is_ancestor_of(&self, other: &RelativePath) -> bool {
        let mine: Vec<&str> = self.components().collect();
        let theirs: Vec<&str> = other.components().collect();
        mine.len() < theirs.len() && theirs.starts_with(&mine)
    }
}

impl PartialEq for RelativePath {
    fn eq(&self, other: &Self) -> bool {
        self.components().eq(other.components())
    }
}

impl Eq for RelativePath {}

impl Hash for RelativePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for component in self.components() {
            component.hash(state);
        }
    }
}

impl PartialOrd for RelativePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RelativePath {
    /// Component-wise lexicographic order: a path sorts directly before
    /// all of its descendants.
    fn cmp(&self, other: &Self) -> Ordering {
        self.components().cmp(other.components())
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelativePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

// ============================================================================
// Content hashes
// ============================================================================

/// Hash algorithms an adapter may be asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashKind {
    /// SHA-1, 20 bytes
    Sha1,
    /// MD5, 16 bytes
    Md5,
}

impl HashKind {
    /// Digest length in bytes
    #[must_use]
    pub const fn digest_len(self) -> usize {
        match self {
            HashKind::Sha1 => 20,
            HashKind::Md5 => 16,
        }
    }

    /// Lowercase algorithm name used in the textual form
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            HashKind::Sha1 => "sha1",
            HashKind::Md5 => "md5",
        }
    }
}

impl Display for HashKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A content digest tagged with its algorithm
///
/// Textual form is `<kind>:<lowercase hex>`, e.g. `sha1:da39a3ee...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash {
    kind: HashKind,
    digest: Vec<u8>,
}

impl ContentHash {
    /// Create a ContentHash from raw digest bytes
    ///
    /// # Errors
    /// Returns error if the digest length does not match the algorithm
    pub fn new(kind: HashKind, digest: impl Into<Vec<u8>>) -> Result<Self, DomainError> {
        let digest = digest.into();
        if digest.len() != kind.digest_len() {
            return Err(DomainError::InvalidHash(format!(
                "{} digest must be {} bytes, got {}",
                kind,
                kind.digest_len(),
                digest.len()
            )));
        }
        Ok(Self { kind, digest })
    }

    /// Wrap a SHA-1 digest
    #[must_use]
    pub fn sha1(digest: [u8; 20]) -> Self {
        Self {
            kind: HashKind::Sha1,
            digest: digest.to_vec(),
        }
    }

    /// Wrap an MD5 digest
    #[must_use]
    pub fn md5(digest: [u8; 16]) -> Self {
        Self {
            kind: HashKind::Md5,
            digest: digest.to_vec(),
        }
    }

    /// Parse a bare hex digest for the given algorithm
    ///
    /// # Errors
    /// Returns error if the text is not hex or has the wrong length
    pub fn from_hex(kind: HashKind, hex_digest: &str) -> Result<Self, DomainError> {
        let digest = hex::decode(hex_digest.trim())
            .map_err(|e| DomainError::InvalidHash(format!("{hex_digest}: {e}")))?;
        Self::new(kind, digest)
    }

    /// The algorithm of this digest
    #[must_use]
    pub fn kind(&self) -> HashKind {
        self.kind
    }

    /// Raw digest bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.digest
    }

    /// Lowercase hex of the digest, without the algorithm prefix
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, digest) = s
            .split_once(':')
            .ok_or_else(|| DomainError::InvalidHash(format!("Missing algorithm prefix: {s}")))?;
        let kind = match kind {
            "sha1" => HashKind::Sha1,
            "md5" => HashKind::Md5,
            other => {
                return Err(DomainError::InvalidHash(format!(
                    "Unknown hash algorithm: {other}"
                )))
            }
        };
        Self::from_hex(kind, digest)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
