//! # Engine Traits
//!
//! The two seams of the engine: the format decoder it drives
//! ([`NonstreamDecoder`]) and the downstream consumer it feeds
//! ([`OutputSink`]).
//!
//! ## Decoder Contract
//!
//! A non-stream decoder receives the complete encoded file in one call to
//! [`NonstreamDecoder::load`] and from then on renders PCM on demand:
//!
//! ```text
//! load(bytes) ──> decode() ──> decode() ──> ... ──> decode() = None
//!                    ▲  │
//!        seek(t) ────┘  └── DecodeContext::loop_boundary() at loop points
//! ```
//!
//! Seeking, telling and looping are required; loop-count and subsong control
//! are optional and advertised through [`NonstreamDecoder::loop_control`] and
//! [`NonstreamDecoder::subsong_control`]. The engine probes them once, right
//! after construction.
//!
//! ## Threading Model
//!
//! Decoders are `Send`: they are moved into the engine's driving task and
//! never shared. Sinks are `Send + Sync`: the task pushes into them while
//! control handles send flush events.

use crate::allocation::{AllocationNegotiator, AllocationQuery, OutputBuffer};
use crate::clock::{ClockTime, PlaybackClock};
use crate::error::{PlaybackError, Result};
use crate::format::{AudioCaps, AudioInfo, DownstreamFormat, OutputTemplate};
use crate::loop_signal::{LoopDecision, LoopSignal, LoopState};
use crate::segment::Segment;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Downstream
// ============================================================================

/// Reasons downstream refuses a buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Downstream is flushing (a flushing seek is in progress).
    #[error("flushing")]
    Flushing,

    /// Downstream has not accepted an output format yet.
    #[error("not negotiated")]
    NotNegotiated,

    /// Downstream already saw end of stream.
    #[error("end of stream")]
    Eos,

    /// Nothing is connected downstream.
    #[error("not linked")]
    NotLinked,

    #[error("{0}")]
    Error(String),
}

impl FlowError {
    /// `true` for conditions that are escalated as stream errors. Flushing,
    /// pending negotiation and EOS resolve themselves.
    pub fn is_genuine_failure(&self) -> bool {
        matches!(self, FlowError::NotLinked | FlowError::Error(_))
    }
}

/// Events sent downstream alongside buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum DownstreamEvent {
    /// Interpret following buffers against this segment.
    Segment(Segment),
    FlushStart,
    FlushStop,
    Eos,
    Tags(TagList),
    /// Playback jumped to `position` (loop point).
    Discontinuity { position: ClockTime },
}

/// Downstream consumer of decoded audio.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Deliver one buffer. Ownership moves downstream on success and failure.
    async fn push(&self, buffer: OutputBuffer) -> std::result::Result<(), FlowError>;

    /// Deliver a stream event. Returns whether downstream handled it.
    fn send_event(&self, event: DownstreamEvent) -> bool;

    /// Propose an output format. `false` refuses it.
    fn set_caps(&self, caps: &AudioCaps) -> bool;

    /// Fill in allocator offers. `false` when downstream has no opinion.
    fn query_allocation(&self, query: &mut AllocationQuery) -> bool {
        let _ = query;
        false
    }

    /// Returns and clears downstream's request to renegotiate.
    fn check_reconfigure(&self) -> bool {
        false
    }

    /// Rate and channel count downstream would prefer.
    fn preferred_format(&self) -> DownstreamFormat {
        DownstreamFormat::default()
    }
}

// ============================================================================
// Decoder Data Types
// ============================================================================

/// Metadata found at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagList {
    pub title: Option<String>,
    /// Free-text message embedded by the author
    pub comment: Option<String>,
}

impl TagList {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.comment.is_none()
    }
}

/// Result of a successful [`NonstreamDecoder::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct FormatInfo {
    pub info: AudioInfo,
    /// Duration of the current subsong
    pub duration: Option<ClockTime>,
    pub num_subsongs: u32,
    pub metadata: TagList,
}

impl FormatInfo {
    pub fn new(info: AudioInfo, duration: Option<ClockTime>) -> Self {
        Self {
            info,
            duration,
            num_subsongs: 1,
            metadata: TagList::default(),
        }
    }

    pub fn with_subsongs(mut self, num_subsongs: u32) -> Self {
        self.num_subsongs = num_subsongs;
        self
    }

    pub fn with_metadata(mut self, metadata: TagList) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Which required operations actually work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderCapabilities {
    pub can_seek: bool,
    pub can_tell: bool,
}

impl Default for DecoderCapabilities {
    fn default() -> Self {
        Self {
            can_seek: true,
            can_tell: true,
        }
    }
}

/// Inputs available to [`NonstreamDecoder::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadContext {
    /// Downstream-preferred rate, or the configured default
    pub preferred_rate: u32,
    /// Downstream-preferred channel count, or the configured default
    pub preferred_channels: u16,
    pub initial_subsong: u32,
    pub num_loops: i32,
}

/// One rendered buffer and the number of sample frames in it.
#[derive(Debug)]
pub struct DecodedChunk {
    pub buffer: OutputBuffer,
    pub samples: u64,
}

impl DecodedChunk {
    pub fn new(buffer: OutputBuffer, samples: u64) -> Self {
        Self { buffer, samples }
    }
}

/// Engine services available while a decoder renders.
pub struct DecodeContext<'a> {
    negotiator: &'a mut AllocationNegotiator,
    sink: &'a dyn OutputSink,
    clock: &'a mut PlaybackClock,
    template: &'a OutputTemplate,
    loops: &'a mut LoopState,
    samples_per_buffer: usize,
}

impl<'a> DecodeContext<'a> {
    pub fn new(
        negotiator: &'a mut AllocationNegotiator,
        sink: &'a dyn OutputSink,
        clock: &'a mut PlaybackClock,
        template: &'a OutputTemplate,
        loops: &'a mut LoopState,
        samples_per_buffer: usize,
    ) -> Self {
        Self {
            negotiator,
            sink,
            clock,
            template,
            loops,
            samples_per_buffer,
        }
    }

    /// Current output format.
    pub fn output_info(&self) -> Option<AudioInfo> {
        self.clock.info().copied()
    }

    /// Preferred number of sample frames per buffer.
    pub fn samples_per_buffer(&self) -> usize {
        self.samples_per_buffer
    }

    /// Allocate an output buffer, negotiating first if needed.
    pub fn allocate(&mut self, size: usize) -> Result<OutputBuffer> {
        let info = *self.clock.info().ok_or(PlaybackError::NotLoaded)?;
        self.negotiator.ensure(&info, self.sink)?;
        self.negotiator.allocate(size)
    }

    /// Switch the output format. Forces a renegotiation when it differs.
    pub fn set_output_format(&mut self, info: AudioInfo) -> Result<()> {
        if !self.template.accepts(&info) {
            return Err(PlaybackError::InvalidOutputFormat(info.to_string()));
        }
        if self.clock.set_info(info) {
            self.negotiator.mark_format_changed();
        }
        Ok(())
    }

    /// Report a loop boundary crossing and learn what to do about it.
    pub fn loop_boundary(&mut self) -> LoopDecision {
        self.loops.on_boundary()
    }

    /// Handle to the pending-loop flag, for decoders that detect boundaries
    /// outside of `decode()`.
    pub fn loop_signal(&self) -> LoopSignal {
        self.loops.signal().clone()
    }
}

// ============================================================================
// Decoder Traits
// ============================================================================

/// Loop-count control offered by some decoders.
pub trait LoopControl: Send {
    /// `n < 0` loops forever, `0` never loops, `n > 0` loops `n` times.
    fn set_num_loops(&mut self, n: i32) -> Result<()>;

    /// Loop count actually in effect. The engine adopts it after every
    /// `set_num_loops`, so a decoder can narrow what was asked for.
    fn num_loops(&self) -> i32;
}

/// Subsong selection offered by multi-song formats.
pub trait SubsongControl: Send {
    fn current_subsong(&self) -> u32;

    /// Switch subsongs. Returns the duration of the new subsong.
    fn set_current_subsong(&mut self, index: u32) -> Result<Option<ClockTime>>;

    fn num_subsongs(&self) -> u32;
}

/// A decoder that needs the whole encoded file before producing output.
///
/// # Example
///
/// ```ignore
/// struct Silence { info: AudioInfo, rendered: u64, total: u64 }
///
/// #[async_trait]
/// impl NonstreamDecoder for Silence {
///     async fn load(&mut self, _data: Bytes, ctx: &LoadContext) -> Result<FormatInfo> {
///         self.info = AudioInfo::new(SampleFormat::S16, ctx.preferred_rate, ctx.preferred_channels);
///         Ok(FormatInfo::new(self.info, Some(SECOND)))
///     }
///
///     async fn decode(&mut self, ctx: &mut DecodeContext<'_>) -> Result<Option<DecodedChunk>> {
///         if self.rendered >= self.total {
///             return Ok(None);
///         }
///         let frames = ctx.samples_per_buffer() as u64;
///         let buffer = ctx.allocate(self.info.frames_to_bytes(frames as usize))?;
///         self.rendered += frames;
///         Ok(Some(DecodedChunk::new(buffer, frames)))
///     }
///
///     async fn seek(&mut self, position: ClockTime) -> Result<()> { ... }
///     fn tell(&self) -> ClockTime { ... }
/// }
/// ```
#[async_trait]
pub trait NonstreamDecoder: Send {
    /// Parse the complete encoded file and prepare to render.
    ///
    /// # Errors
    ///
    /// Return [`PlaybackError::LoadRejected`] when the data is not in a
    /// supported format.
    async fn load(&mut self, data: Bytes, ctx: &LoadContext) -> Result<FormatInfo>;

    /// Render the next buffer. `Ok(None)` means end of media and must keep
    /// being returned until a seek or subsong switch.
    async fn decode(&mut self, ctx: &mut DecodeContext<'_>) -> Result<Option<DecodedChunk>>;

    /// Move to `position` within the current subsong.
    async fn seek(&mut self, position: ClockTime) -> Result<()>;

    /// Current position within the current subsong, 0 before load.
    fn tell(&self) -> ClockTime;

    fn capabilities(&self) -> DecoderCapabilities {
        DecoderCapabilities::default()
    }

    /// Formats this decoder is able to produce.
    fn output_template(&self) -> OutputTemplate {
        OutputTemplate::any()
    }

    fn loop_control(&mut self) -> Option<&mut dyn LoopControl> {
        None
    }

    fn subsong_control(&mut self) -> Option<&mut dyn SubsongControl> {
        None
    }
}
