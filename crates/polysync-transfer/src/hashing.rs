//! Content hashing
//!
//! One-shot and incremental SHA-1 / MD5 over byte buffers, producing
//! [`ContentHash`] values tagged with their algorithm.

use md5::Md5;
use polysync_core::domain::{ContentHash, HashKind};
use sha1::{Digest, Sha1};

/// Hashes `data` in one call
pub fn compute_hash(kind: HashKind, data: &[u8]) -> ContentHash {
    let mut hasher = ContentHasher::new(kind);
    hasher.update(data);
    hasher.finalize()
}

enum Inner {
    Sha1(Sha1),
    Md5(Md5),
}

/// Incremental hasher for content streamed in pieces
pub struct ContentHasher {
    inner: Inner,
    bytes: u64,
}

impl ContentHasher {
    /// Starts a new hash of the given kind
    pub fn new(kind: HashKind) -> Self {
        let inner = match kind {
            HashKind::Sha1 => Inner::Sha1(Sha1::new()),
            HashKind::Md5 => Inner::Md5(Md5::new()),
        };
        Self { inner, bytes: 0 }
    }

    /// Algorithm of this hasher
    pub fn kind(&self) -> HashKind {
        match self.inner {
            Inner::Sha1(_) => HashKind::Sha1,
            Inner::Md5(_) => HashKind::Md5,
        }
    }

    /// Feeds more bytes
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha1(hasher) => hasher.update(data),
            Inner::Md5(hasher) => hasher.update(data),
        }
        self.bytes += data.len() as u64;
    }

    /// Number of bytes hashed so far
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Finishes the hash
    pub fn finalize(self) -> ContentHash {
        match self.inner {
            Inner::Sha1(hasher) => ContentHash::sha1(hasher.finalize().into()),
            Inner::Md5(hasher) => ContentHash::md5(hasher.finalize().into()),
        }
    }
}
