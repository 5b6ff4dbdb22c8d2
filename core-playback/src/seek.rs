//! # Seek Coordination
//!
//! ```text
//!            entry guard fails
//!        ┌──────────────────────┐
//!        ▼                      │
//!     ┌──────┐  request    ┌────┴────┐
//!     │ Idle ├────────────>│ Seeking │
//!     └──────┘<────────────┴─────────┘
//!              committed / refused
//! ```
//!
//! The entry guard runs twice: in the handle, against the published status
//! snapshot, before anything is flushed; and in the driving task, against
//! live state, before the segment is recomputed. Once in `Seeking` the new
//! segment is computed from the old one and the decoder is moved. Only when
//! both succeed is the segment committed to the clock. A failure on either
//! step leaves the previous segment and sample offset untouched.

use crate::clock::{ClockTime, PlaybackClock};
use crate::config::EngineStatus;
use crate::error::{PlaybackError, Result};
use crate::segment::{SeekFormat, SeekRequest, Segment};
use crate::traits::NonstreamDecoder;
use tracing::{debug, instrument, warn};

/// Seek coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekState {
    Idle,
    Seeking,
}

/// Runs seeks against the decoder and the clock.
#[derive(Debug)]
pub struct SeekCoordinator {
    state: SeekState,
}

impl SeekCoordinator {
    pub fn new() -> Self {
        Self {
            state: SeekState::Idle,
        }
    }

    pub fn state(&self) -> SeekState {
        self.state
    }

    /// Reject requests that cannot possibly succeed.
    pub fn check_entry(status: &EngineStatus, request: &SeekRequest) -> Result<()> {
        if request.format != SeekFormat::Time {
            return Err(PlaybackError::UnsupportedSeekFormat(
                request.format.to_string(),
            ));
        }
        if !status.is_ready() {
            return Err(PlaybackError::NotLoaded);
        }
        if !status.can_seek {
            return Err(PlaybackError::SeekNotSupported);
        }
        Ok(())
    }

    /// Recompute the segment, move the decoder and commit both.
    ///
    /// `current_position` is where playback is now; non-flushing seeks keep
    /// the running time reached there.
    #[instrument(skip(self, decoder, clock), fields(start = request.start, flush = request.flags.flush))]
    pub async fn perform(
        &mut self,
        request: &SeekRequest,
        decoder: &mut dyn NonstreamDecoder,
        clock: &mut PlaybackClock,
        current_position: ClockTime,
    ) -> Result<Segment> {
        self.state = SeekState::Seeking;
        let result = Self::seek_decoder(request, decoder, clock, current_position).await;
        self.state = SeekState::Idle;

        match result {
            Ok(segment) => {
                debug!(
                    start = segment.start,
                    stop = ?segment.stop,
                    base = segment.base,
                    "Seek committed"
                );
                clock.commit_segment(segment.clone());
                Ok(segment)
            }
            Err(e) => {
                warn!(error = %e, "Seek refused");
                Err(e)
            }
        }
    }

    async fn seek_decoder(
        request: &SeekRequest,
        decoder: &mut dyn NonstreamDecoder,
        clock: &PlaybackClock,
        current_position: ClockTime,
    ) -> Result<Segment> {
        let segment = clock.segment().do_seek(request, current_position)?;

        decoder.seek(segment.position).await.map_err(|e| {
            if e.is_seek_failure() {
                e
            } else {
                PlaybackError::SeekRejected(e.to_string())
            }
        })?;

        Ok(segment)
    }
}

impl Default for SeekCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
