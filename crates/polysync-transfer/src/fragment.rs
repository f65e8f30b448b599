//! Download fragment reader
//!
//! [`FragmentReader`] exposes a ranged backend as a forward-only byte
//! stream. One fixed-size range ("fragment") is fetched at a time, and only
//! once the previous one has been consumed. The reader is not restartable:
//! re-reading requires a new reader.

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use polysync_core::domain::SyncFault;
use polysync_core::ports::IReadStream;
use tracing::debug;

/// One ranged response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Bytes of the range
    pub data: Bytes,
    /// Total object length, when the backend reported it
    pub total_length: Option<u64>,
}

/// Backend able to serve byte ranges of one object
#[async_trait]
pub trait FragmentSource: Send {
    /// Fetches at most `length` bytes starting at `offset`
    async fn fetch(&mut self, offset: u64, length: u64) -> Result<Fragment, SyncFault>;
}

/// Forward-only reader pulling fragments on demand
pub struct FragmentReader<S> {
    source: S,
    fragment_size: u64,
    total_length: Option<u64>,
    next_offset: u64,
    current: Bytes,
    delivered: u64,
    finished: bool,
    requests: u32,
}

impl<S: FragmentSource> FragmentReader<S> {
    /// Creates a reader; `expected_length` may be `None` when the first
    /// response is expected to report it
    pub fn new(source: S, fragment_size: u64, expected_length: Option<u64>) -> Self {
        Self {
            source,
            fragment_size: fragment_size.max(1),
            total_length: expected_length,
            next_offset: 0,
            current: Bytes::new(),
            delivered: 0,
            finished: expected_length == Some(0),
            requests: 0,
        }
    }

    /// Number of fragments requested so far
    pub fn requests(&self) -> u32 {
        self.requests
    }

    /// Bytes handed to the caller so far
    pub fn position(&self) -> u64 {
        self.delivered
    }

    /// Object length, once known
    pub fn total_length(&self) -> Option<u64> {
        self.total_length
    }

    /// True once the last fragment has been fetched
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    async fn fetch_next(&mut self) -> Result<(), SyncFault> {
        let length = match self.total_length {
            Some(total) if self.next_offset >= total => {
                self.finished = true;
                return Ok(());
            }
            Some(total) => self.fragment_size.min(total - self.next_offset),
            None => self.fragment_size,
        };

        let fragment = self.source.fetch(self.next_offset, length).await?;
        self.requests += 1;

        match (self.total_length, fragment.total_length) {
            (Some(known), Some(reported)) if known != reported => {
                return Err(SyncFault::SizeMismatch {
                    declared: known,
                    actual: reported,
                });
            }
            (None, reported) => self.total_length = reported,
            _ => {}
        }

        let received = fragment.data.len() as u64;
        if received > length {
            return Err(SyncFault::SizeMismatch {
                declared: length,
                actual: received,
            });
        }
        debug!(
            offset = self.next_offset,
            requested = length,
            received,
            "Fetched fragment"
        );

        self.next_offset += received;
        match self.total_length {
            Some(total) if received == 0 && self.next_offset < total => {
                return Err(SyncFault::SizeMismatch {
                    declared: total,
                    actual: self.next_offset,
                });
            }
            Some(total) => self.finished = self.next_offset >= total,
            None => self.finished = received < length,
        }

        self.current = fragment.data;
        Ok(())
    }
}

#[async_trait]
impl<S: FragmentSource> IReadStream for FragmentReader<S> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SyncFault> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.current.is_empty() {
                if self.finished {
                    break;
                }
                self.fetch_next().await?;
                continue;
            }
            let n = self.current.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&self.current[..n]);
            self.current.advance(n);
            filled += n;
        }
        self.delivered += filled as u64;
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemorySource {
        data: Bytes,
        report_total: bool,
        calls: Vec<(u64, u64)>,
    }

    impl MemorySource {
        fn new(len: usize) -> Self {
            Self {
                data: (0..len).map(|i| (i % 253) as u8).collect::<Vec<u8>>().into(),
                report_total: true,
                calls: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl FragmentSource for MemorySource {
        async fn fetch(&mut self, offset: u64, length: u64) -> Result<Fragment, SyncFault> {
            self.calls.push((offset, length));
            let start = (offset as usize).min(self.data.len());
            let end = (start + length as usize).min(self.data.len());
            Ok(Fragment {
                data: self.data.slice(start..end),
                total_length: self.report_total.then_some(self.data.len() as u64),
            })
        }
    }

    async fn read_all<S: FragmentSource>(reader: &mut FragmentReader<S>, buf_size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; buf_size];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            out.extend_from_slice(&buf[..n]);
            if n < buf_size {
                break;
            }
        }
        out
    }

    #[tokio::test]
    async fn test_unaligned_reads_fetch_ceil_fragments() {
        let fragment = 10u64;
        for len in [1usize, 9, 10, 11, 55, 100] {
            for buf_size in [1usize, 3, 7, 10, 64] {
                let source = MemorySource::new(len);
                let expected = source.data.clone();
                let mut reader = FragmentReader::new(source, fragment, None);

                let got = read_all(&mut reader, buf_size).await;
                assert_eq!(got, expected, "len={len} buf={buf_size}");
                assert_eq!(
                    reader.requests() as usize,
                    len.div_ceil(fragment as usize),
                    "len={len} buf={buf_size}"
                );
                assert_eq!(reader.position(), len as u64);
            }
        }
    }

    #[tokio::test]
    async fn test_short_read_only_at_end() {
        let mut reader = FragmentReader::new(MemorySource::new(25), 10, Some(25));
        let mut buf = [0u8; 12];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 12);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 12);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 1);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        assert_eq!(reader.requests(), 3);
    }

    #[tokio::test]
    async fn test_fragments_fetched_lazily() {
        let mut reader = FragmentReader::new(MemorySource::new(30), 10, None);
        let mut buf = [0u8; 4];
        reader.read(&mut buf).await.unwrap();
        assert_eq!(reader.requests(), 1);
        reader.read(&mut buf).await.unwrap();
        assert_eq!(reader.requests(), 1);
        reader.read(&mut buf).await.unwrap();
        assert_eq!(reader.requests(), 2);
        assert_eq!(reader.source.calls, vec![(0, 10), (10, 10)]);
    }

    #[tokio::test]
    async fn test_empty_object_needs_no_request() {
        let mut reader = FragmentReader::new(MemorySource::new(0), 10, Some(0));
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        assert_eq!(reader.requests(), 0);
    }

    #[tokio::test]
    async fn test_unknown_total_ends_on_short_fragment() {
        let mut source = MemorySource::new(25);
        source.report_total = false;
        let expected = source.data.clone();
        let mut reader = FragmentReader::new(source, 10, None);

        let got = read_all(&mut reader, 8).await;
        assert_eq!(got, expected);
        assert_eq!(reader.requests(), 3);
    }

    #[tokio::test]
    async fn test_truncated_object_is_size_mismatch() {
        let mut reader = FragmentReader::new(MemorySource::new(15), 10, Some(40));
        let mut buf = [0u8; 64];
        let err = reader.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, SyncFault::SizeMismatch { declared: 40, actual: 15 }));
    }
}
