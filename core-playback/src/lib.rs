//! # Non-Stream Playback Engine
//!
//! Drives decoders that need the whole encoded file before producing any
//! audio: tracker modules, chiptunes, game music formats.
//!
//! ## Overview
//!
//! - [`source`]: fetch the complete source (pull) or accumulate it (push)
//! - [`traits`]: the decoder and sink seams
//! - [`clock`] / [`segment`]: timestamps, sample offsets and seek segments
//! - [`seek`]: validate, apply and commit seeks
//! - [`loop_signal`]: loop-count policy and the pending-loop flag
//! - [`allocation`]: output format and allocator negotiation with downstream
//! - `streaming`: the task that ties all of it together
//! - [`engine`]: builder and control handle
//! - [`registry`]: media-type to decoder lookup
//! - [`decoder`]: the bundled tone-sheet decoder

pub mod allocation;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod format;
pub mod loop_signal;
pub mod registry;
pub mod seek;
pub mod segment;
pub mod source;
mod streaming;
pub mod traits;

pub use allocation::{
    AllocationDecider, AllocationNegotiator, AllocationOffer, AllocationParams, AllocationQuery,
    Allocator, DefaultAllocationDecider, OutputBuffer, SystemAllocator,
};
pub use clock::{BufferTiming, ClockTime, PlaybackClock, SECOND};
pub use config::{EngineConfig, EngineStatus, PlaybackStats, TaskState};
pub use engine::{EngineHandle, NonstreamEngine, NonstreamEngineBuilder, SeekingInfo};
pub use error::{PlaybackError, Result};
pub use format::{AudioCaps, AudioInfo, DownstreamFormat, OutputTemplate, SampleFormat};
pub use loop_signal::{LoopDecision, LoopSignal, LoopState};
pub use registry::{DecoderRegistration, DecoderRegistry};
pub use segment::{SeekFlags, SeekFormat, SeekRequest, SeekType, Segment};
pub use source::{PushAccumulator, SourceLoader};
pub use traits::{
    DecodeContext, DecodedChunk, DecoderCapabilities, DownstreamEvent, FlowError, FormatInfo,
    LoadContext, LoopControl, NonstreamDecoder, OutputSink, SubsongControl, TagList,
};
