//! Multipart upload sessions
//!
//! ```text
//!   Created ──first part──► PartsInFlight ──commit──► Finishing ──► Completed
//!      │                          │                       │
//!      └──────────────┬───────────┴───────────────────────┘
//!                     ▼
//!          Cancelled (abort succeeded) / Faulted (any failure)
//! ```
//!
//! Each part is hashed locally, uploaded, and recorded under its 1-based
//! part number before the counter moves on. Commit submits the ordered
//! part hashes so the backend can validate them; it is refused without
//! contacting the backend's finish endpoint if fewer bytes than declared
//! were uploaded.
//!
//! A Faulted session still owns a partial object on the backend. Closing the
//! handle through `abort` or `commit` asks the backend to discard it, once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use polysync_core::domain::{
    ContentHash, EntryId, EntryUpdateInfo, HashKind, ItemId, RelativePath, SyncFault,
};
use polysync_core::ports::{CommittedItem, IWriteStream};
use tracing::{debug, error, info, warn};

use crate::chunker::{ChunkedWriter, PartSink};
use crate::hashing::compute_hash;

// ============================================================================
// Backend contract
// ============================================================================

/// Where parts of one upload are sent
#[derive(Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Part upload URL (or equivalent continuation token)
    pub upload_url: String,
}

impl fmt::Debug for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Upload URLs can embed signed query strings.
        let shown = self
            .upload_url
            .split_once('?')
            .map_or(self.upload_url.as_str(), |(base, _)| base);
        f.debug_struct("UploadTarget")
            .field("upload_url", &shown)
            .finish()
    }
}

/// Backend endpoints needed to drive a multipart upload
#[async_trait]
pub trait MultipartBackend: Send + Sync {
    /// Hash algorithm the backend validates parts with
    fn part_hash_kind(&self) -> HashKind {
        HashKind::Sha1
    }

    /// Starts an upload and returns the backend's file id for it
    async fn start_upload(
        &self,
        update: &EntryUpdateInfo,
        total_length: u64,
    ) -> Result<String, SyncFault>;

    /// Obtains a target for uploading parts of `file_id`
    async fn get_part_target(&self, file_id: &str) -> Result<UploadTarget, SyncFault>;

    /// Uploads one part
    async fn upload_part(
        &self,
        target: &UploadTarget,
        part_number: u32,
        data: Bytes,
        hash: &ContentHash,
    ) -> Result<(), SyncFault>;

    /// Commits the object from its ordered part hashes
    async fn finish_upload(
        &self,
        file_id: &str,
        part_hashes: &[ContentHash],
    ) -> Result<ItemId, SyncFault>;

    /// Discards the partial object
    async fn cancel_upload(&self, file_id: &str) -> Result<(), SyncFault>;
}

// ============================================================================
// Session state
// ============================================================================

/// State of a multipart upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upload target obtained, no part uploaded yet
    Created,
    /// At least one part uploaded
    PartsInFlight,
    /// Ordered part hashes submitted
    Finishing,
    /// Backend returned the final object id
    Completed,
    /// Aborted by the caller
    Cancelled,
    /// A backend call or integrity check failed
    Faulted,
}

impl SessionState {
    /// Completed, Cancelled and Faulted accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Faulted
        )
    }
}

/// Mutable state of one in-flight multipart upload
#[derive(Debug)]
pub struct UploadSession {
    entry_id: EntryId,
    relative_path: RelativePath,
    total_length: u64,
    file_id: String,
    target: UploadTarget,
    current_part: u32,
    part_hashes: BTreeMap<u32, ContentHash>,
    bytes_uploaded: u64,
    state: SessionState,
    discarded: bool,
}

impl UploadSession {
    fn new(update: &EntryUpdateInfo, total_length: u64, file_id: String, target: UploadTarget) -> Self {
        Self {
            entry_id: update.entry.id(),
            relative_path: update.relative_path.clone(),
            total_length,
            file_id,
            target,
            current_part: 1,
            part_hashes: BTreeMap::new(),
            bytes_uploaded: 0,
            state: SessionState::Created,
            discarded: false,
        }
    }

    /// Entry being uploaded
    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    /// Path being uploaded
    pub fn relative_path(&self) -> &RelativePath {
        &self.relative_path
    }

    /// Declared object size
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Backend file id of the in-progress object
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Number the next part will be uploaded under (1-based)
    pub fn current_part_number(&self) -> u32 {
        self.current_part
    }

    /// Hashes of the uploaded parts, by part number
    pub fn part_hashes(&self) -> &BTreeMap<u32, ContentHash> {
        &self.part_hashes
    }

    /// Bytes acknowledged by the backend
    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the backend has been told to discard the partial object
    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(
                path = %self.relative_path,
                from = ?self.state,
                to = ?next,
                "Upload session state change"
            );
            self.state = next;
        }
    }

    fn record_part(&mut self, part_number: u32, hash: ContentHash, len: u64) {
        self.part_hashes.insert(part_number, hash);
        self.bytes_uploaded += len;
        self.current_part = part_number + 1;
    }

    /// Part hashes in part-number order, sized to the parts actually uploaded
    ///
    /// # Errors
    /// Returns an integrity fault if the recorded part numbers are not
    /// exactly `1..=n`
    pub fn ordered_part_hashes(&self) -> Result<Vec<ContentHash>, SyncFault> {
        for (expected, number) in (1u32..).zip(self.part_hashes.keys()) {
            if *number != expected {
                return Err(SyncFault::IntegrityMismatch {
                    part_number: expected,
                    message: format!("part numbers are not contiguous: found {number}"),
                });
            }
        }
        Ok(self.part_hashes.values().cloned().collect())
    }
}

// ============================================================================
// Part sink
// ============================================================================

/// [`PartSink`] that uploads parts into a session
pub struct SessionSink<B> {
    backend: Arc<B>,
    session: UploadSession,
}

impl<B> SessionSink<B> {
    /// The session driven by this sink
    pub fn session(&self) -> &UploadSession {
        &self.session
    }
}

#[async_trait]
impl<B: MultipartBackend> PartSink for SessionSink<B> {
    async fn upload_part(&mut self, part: Bytes, offset: u64, index: u32) -> Result<(), SyncFault> {
        let part_number = self.session.current_part;
        if index + 1 != part_number {
            self.session.transition(SessionState::Faulted);
            return Err(SyncFault::contract(format!(
                "part index {index} does not follow part number {}",
                part_number - 1
            )));
        }

        let len = part.len() as u64;
        let hash = compute_hash(self.backend.part_hash_kind(), &part);
        self.session.transition(SessionState::PartsInFlight);
        debug!(
            path = %self.session.relative_path,
            part_number,
            offset,
            len,
            "Uploading part"
        );

        match self
            .backend
            .upload_part(&self.session.target, part_number, part, &hash)
            .await
        {
            Ok(()) => {
                self.session.record_part(part_number, hash, len);
                Ok(())
            }
            Err(fault) => {
                error!(
                    path = %self.session.relative_path,
                    part_number,
                    error = %fault,
                    "Part upload failed"
                );
                self.session.transition(SessionState::Faulted);
                Err(fault)
            }
        }
    }
}

// ============================================================================
// MultipartUpload
// ============================================================================

/// Write handle backed by a multipart upload session
pub struct MultipartUpload<B: MultipartBackend> {
    writer: ChunkedWriter<SessionSink<B>>,
}

impl<B: MultipartBackend> MultipartUpload<B> {
    /// Starts a session for `total_length` bytes split into `part_size` parts
    pub async fn start(
        backend: Arc<B>,
        update: &EntryUpdateInfo,
        total_length: u64,
        part_size: usize,
    ) -> Result<Self, SyncFault> {
        if part_size == 0 {
            return Err(SyncFault::contract("part size must be greater than 0"));
        }
        let file_id = backend.start_upload(update, total_length).await?;
        let target = match backend.get_part_target(&file_id).await {
            Ok(target) => target,
            Err(fault) => {
                if let Err(cancel_fault) = backend.cancel_upload(&file_id).await {
                    warn!(file_id = %file_id, error = %cancel_fault, "Failed to cancel upload after start failure");
                }
                return Err(fault);
            }
        };
        info!(
            path = %update.relative_path,
            total_length,
            part_size,
            "Started multipart upload"
        );

        let session = UploadSession::new(update, total_length, file_id, target);
        let sink = SessionSink { backend, session };
        let writer = ChunkedWriter::new(sink, part_size, total_length)?;
        Ok(Self { writer })
    }

    /// The underlying session
    pub fn session(&self) -> &UploadSession {
        &self.writer.sink().session
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.session().state
    }

    fn session_mut(&mut self) -> &mut UploadSession {
        &mut self.writer.sink_mut().session
    }

    fn backend(&self) -> Arc<B> {
        Arc::clone(&self.writer.sink().backend)
    }

    fn ensure_writable(&self) -> Result<(), SyncFault> {
        let state = self.state();
        if state.is_terminal() || state == SessionState::Finishing {
            return Err(SyncFault::contract(format!(
                "upload session no longer accepts writes (state {state:?})"
            )));
        }
        Ok(())
    }

    /// Asks the backend to drop the partial object, at most once per session
    ///
    /// Leaves the state untouched.
    async fn discard_remote(&mut self) -> Result<(), SyncFault> {
        if self.session().discarded {
            return Ok(());
        }
        let backend = self.backend();
        let file_id = self.session().file_id.clone();
        match backend.cancel_upload(&file_id).await {
            Ok(()) => {
                self.session_mut().discarded = true;
                debug!(path = %self.session().relative_path, file_id = %file_id, "Partial object discarded");
                Ok(())
            }
            Err(fault) => {
                warn!(
                    path = %self.session().relative_path,
                    file_id = %file_id,
                    error = %fault,
                    "Failed to discard partial object"
                );
                Err(fault)
            }
        }
    }

    async fn cancel_remote(&mut self) -> Result<(), SyncFault> {
        match self.discard_remote().await {
            Ok(()) => {
                self.session_mut().transition(SessionState::Cancelled);
                Ok(())
            }
            Err(fault) => {
                self.session_mut().transition(SessionState::Faulted);
                Err(fault)
            }
        }
    }

    async fn finish(&mut self) -> Result<CommittedItem, SyncFault> {
        if let Err(fault) = self.writer.flush().await {
            self.session_mut().transition(SessionState::Faulted);
            let _ = self.discard_remote().await;
            return Err(fault);
        }

        let session = self.session();
        if session.bytes_uploaded != session.total_length {
            let fault = SyncFault::SizeMismatch {
                declared: session.total_length,
                actual: self.writer.bytes_accepted(),
            };
            error!(path = %session.relative_path, error = %fault, "Refusing to finish upload");
            self.session_mut().transition(SessionState::Faulted);
            let _ = self.discard_remote().await;
            return Err(fault);
        }

        let hashes = session.ordered_part_hashes()?;
        self.session_mut().transition(SessionState::Finishing);

        let backend = self.backend();
        let file_id = self.session().file_id.clone();
        match backend.finish_upload(&file_id, &hashes).await {
            Ok(item_id) => {
                self.session_mut().transition(SessionState::Completed);
                info!(
                    path = %self.session().relative_path,
                    parts = hashes.len(),
                    bytes = self.session().bytes_uploaded,
                    "Multipart upload completed"
                );
                Ok(CommittedItem {
                    item_id,
                    size: self.session().bytes_uploaded,
                    hash: None,
                })
            }
            Err(fault) => {
                error!(path = %self.session().relative_path, error = %fault, "Finishing upload failed");
                self.session_mut().transition(SessionState::Faulted);
                let _ = self.discard_remote().await;
                Err(fault)
            }
        }
    }
}

#[async_trait]
impl<B: MultipartBackend + 'static> IWriteStream for MultipartUpload<B> {
    async fn write(&mut self, data: &[u8]) -> Result<(), SyncFault> {
        self.ensure_writable()?;
        let result = self.writer.write(data).await;
        if result.is_err() {
            self.session_mut().transition(SessionState::Faulted);
        }
        result
    }

    async fn flush(&mut self) -> Result<(), SyncFault> {
        self.ensure_writable()?;
        let result = self.writer.flush().await;
        if result.is_err() {
            self.session_mut().transition(SessionState::Faulted);
        }
        result
    }

    fn bytes_written(&self) -> u64 {
        self.writer.bytes_accepted()
    }

    fn expected_length(&self) -> u64 {
        self.writer.total_length()
    }

    async fn commit(self: Box<Self>) -> Result<CommittedItem, SyncFault> {
        let mut upload = self;
        if let Err(fault) = upload.ensure_writable() {
            // The handle is consumed here, so nobody can abort it afterwards.
            if upload.state() == SessionState::Faulted {
                let _ = upload.discard_remote().await;
            }
            return Err(fault);
        }
        upload.finish().await
    }

    async fn abort(self: Box<Self>) -> Result<(), SyncFault> {
        let mut upload = self;
        match upload.state() {
            SessionState::Completed | SessionState::Cancelled => return Ok(()),
            SessionState::Faulted => {
                warn!(
                    path = %upload.session().relative_path,
                    file_id = %upload.session().file_id,
                    written = upload.writer.bytes_accepted(),
                    "Discarding faulted multipart upload"
                );
                return upload.discard_remote().await;
            }
            _ => {}
        }
        warn!(
            path = %upload.session().relative_path,
            written = upload.writer.bytes_accepted(),
            declared = upload.writer.total_length(),
            "Multipart upload closed before reaching its declared length, cancelling"
        );
        upload.cancel_remote().await
    }
}

impl<B: MultipartBackend> Drop for MultipartUpload<B> {
    fn drop(&mut self) {
        let session = self.session();
        let settled = matches!(
            session.state,
            SessionState::Completed | SessionState::Cancelled
        );
        if !settled && !session.discarded {
            warn!(
                path = %session.relative_path,
                file_id = %session.file_id,
                "Multipart upload dropped without commit or abort; the partial object is left on the backend"
            );
        }
    }
}
