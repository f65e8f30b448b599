//! Upload chunker
//!
//! [`ChunkedWriter`] accepts writes of any size and hands fixed-size parts
//! to a [`PartSink`]. A part is emitted exactly when:
//!
//! - the buffered bytes reach the part size, or
//! - the buffered bytes are the final tail of the declared length (the
//!   last part may be shorter than a full one).
//!
//! Parts are emitted in order and never twice. Writing past the declared
//! length fails immediately; nothing is truncated.
//!
//! The backlog is a single `BytesMut`: small writes coalesce into it and
//! each part is split off the front without copying what remains.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use polysync_core::domain::SyncFault;
use tracing::trace;

/// Receiver of the parts produced by a [`ChunkedWriter`]
#[async_trait]
pub trait PartSink: Send {
    /// Uploads one part
    ///
    /// `offset` is the byte offset of the part in the object, `index` its
    /// 0-based position in emission order.
    async fn upload_part(&mut self, part: Bytes, offset: u64, index: u32)
        -> Result<(), SyncFault>;
}

/// Buffering sink that slices a byte stream into parts
#[derive(Debug)]
pub struct ChunkedWriter<S> {
    sink: S,
    part_size: usize,
    total_length: u64,
    buffer: BytesMut,
    accepted: u64,
    emitted: u64,
    parts: u32,
    failed: bool,
}

impl<S: PartSink> ChunkedWriter<S> {
    /// Creates a writer for exactly `total_length` bytes
    ///
    /// # Errors
    /// Returns a contract violation if `part_size` is zero
    pub fn new(sink: S, part_size: usize, total_length: u64) -> Result<Self, SyncFault> {
        if part_size == 0 {
            return Err(SyncFault::contract("part size must be greater than 0"));
        }
        Ok(Self {
            sink,
            part_size,
            total_length,
            buffer: BytesMut::with_capacity(part_size),
            accepted: 0,
            emitted: 0,
            parts: 0,
            failed: false,
        })
    }

    /// Appends bytes, emitting every part that becomes ready
    ///
    /// # Errors
    /// Returns a contract violation if the write would exceed the declared
    /// length or the writer already failed; returns the sink's fault if a
    /// part upload fails
    pub async fn write(&mut self, data: &[u8]) -> Result<(), SyncFault> {
        if self.failed {
            return Err(SyncFault::contract("write after a failed part upload"));
        }
        let remaining = self.total_length - self.accepted;
        if data.len() as u64 > remaining {
            return Err(SyncFault::contract(format!(
                "write of {} bytes exceeds the declared length ({} of {} bytes already written)",
                data.len(),
                self.accepted,
                self.total_length
            )));
        }

        self.buffer.extend_from_slice(data);
        self.accepted += data.len() as u64;
        self.drain().await
    }

    /// Emits whatever is ready
    ///
    /// With less than one part buffered and the buffer not being the tail,
    /// this is a no-op and the buffered bytes stay in place.
    pub async fn flush(&mut self) -> Result<(), SyncFault> {
        if self.failed {
            return Err(SyncFault::contract("flush after a failed part upload"));
        }
        self.drain().await
    }

    async fn drain(&mut self) -> Result<(), SyncFault> {
        loop {
            let buffered = self.buffer.len();
            let len = if buffered >= self.part_size {
                self.part_size
            } else if buffered > 0 && self.emitted + buffered as u64 == self.total_length {
                buffered
            } else {
                return Ok(());
            };

            let part = self.buffer.split_to(len).freeze();
            let offset = self.emitted;
            let index = self.parts;
            trace!(index, offset, len, "Emitting part");

            if let Err(fault) = self.sink.upload_part(part, offset, index).await {
                self.failed = true;
                return Err(fault);
            }
            self.emitted += len as u64;
            self.parts += 1;
        }
    }

    /// Declared total length
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Configured part size
    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Bytes accepted from the caller
    pub fn bytes_accepted(&self) -> u64 {
        self.accepted
    }

    /// Bytes handed to the sink
    pub fn bytes_emitted(&self) -> u64 {
        self.emitted
    }

    /// Bytes waiting in the buffer
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of parts emitted
    pub fn parts_emitted(&self) -> u32 {
        self.parts
    }

    /// True once every declared byte reached the sink
    pub fn is_complete(&self) -> bool {
        self.emitted == self.total_length
    }

    /// True after a part upload failed
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// The sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The sink, mutably
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consumes the writer and returns the sink
    pub fn into_sink(self) -> S {
        self.sink
    }
}
