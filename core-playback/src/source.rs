//! # Source Loading
//!
//! Non-stream decoders get the complete encoded file or nothing. In pull
//! mode the whole byte range is requested at once; in push mode chunks are
//! accumulated until the declared length or end-of-input is reached. Partial
//! data is never handed onward.

use crate::error::{PlaybackError, Result};
use bridge_traits::source::UpstreamSource;
use bytes::{Bytes, BytesMut};
use tracing::{debug, instrument, trace};

/// Fetches an entire pull-capable source in one request.
pub struct SourceLoader;

impl SourceLoader {
    /// Read the full byte range of `source`.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::SizeUnknown`] when the source cannot report its length
    /// - [`PlaybackError::SourceError`] when the read fails or comes back short
    #[instrument(skip(source), fields(source = %source.describe()))]
    pub async fn load_pull(source: &dyn UpstreamSource) -> Result<Bytes> {
        let length = source
            .byte_length()
            .await
            .ok_or(PlaybackError::SizeUnknown)?;

        debug!(length, "Pulling entire upstream range");
        let data = source.pull_range(0, length).await?;

        if (data.len() as u64) < length {
            return Err(PlaybackError::SourceError(format!(
                "short read: got {} of {} bytes",
                data.len(),
                length
            )));
        }

        // Sources may hand back more than asked for
        Ok(data.slice(..length as usize))
    }
}

/// Collects pushed chunks until the source is complete.
#[derive(Debug)]
pub struct PushAccumulator {
    expected: Option<u64>,
    buffer: BytesMut,
    complete: bool,
}

impl PushAccumulator {
    /// `expected` is the declared upstream length, if known.
    pub fn new(expected: Option<u64>) -> Self {
        let capacity = expected
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0);

        Self {
            expected,
            buffer: BytesMut::with_capacity(capacity),
            complete: false,
        }
    }

    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    pub fn received(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Append a chunk. Returns the complete source once the declared length
    /// is reached; bytes beyond it are dropped.
    pub fn push_chunk(&mut self, chunk: Bytes) -> Option<Bytes> {
        if self.complete {
            trace!(len = chunk.len(), "Dropping chunk after completion");
            return None;
        }

        self.buffer.extend_from_slice(&chunk);
        trace!(received = self.buffer.len(), expected = ?self.expected, "Accumulated chunk");

        match self.expected {
            Some(expected) if self.received() >= expected => {
                self.buffer.truncate(expected as usize);
                Some(self.take())
            }
            _ => None,
        }
    }

    /// Upstream signalled end-of-input: hand over whatever arrived.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::SizeUnknown`] when no length was declared and
    /// nothing arrived, [`PlaybackError::AlreadyLoaded`] when the source was
    /// already handed over.
    pub fn finish(&mut self) -> Result<Bytes> {
        if self.complete {
            return Err(PlaybackError::AlreadyLoaded);
        }
        if self.buffer.is_empty() && self.expected.is_none() {
            return Err(PlaybackError::SizeUnknown);
        }

        if let Some(expected) = self.expected {
            if self.received() < expected {
                debug!(
                    received = self.received(),
                    expected, "End of input before the declared length"
                );
            }
        }
        Ok(self.take())
    }

    fn take(&mut self) -> Bytes {
        self.complete = true;
        self.buffer.split().freeze()
    }
}
