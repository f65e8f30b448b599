//! polysync Transfer - Chunked transfer engine
//!
//! Lets backends that need fixed-size chunks be driven by ordinary
//! sequential reads and writes:
//! - [`chunker`] - Buffering part emitter for uploads
//! - [`fragment`] - Lazy ranged reader for downloads
//! - [`hashing`] - SHA-1 / MD5 helpers used for part and object hashes
//! - [`multipart`] - Multipart upload session state machine

pub mod chunker;
pub mod fragment;
pub mod hashing;
pub mod multipart;

pub use chunker::{ChunkedWriter, PartSink};
pub use fragment::{Fragment, FragmentReader, FragmentSource};
pub use hashing::{compute_hash, ContentHasher};
pub use multipart::{
    MultipartBackend, MultipartUpload, SessionState, UploadSession, UploadTarget,
};
