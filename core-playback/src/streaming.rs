//! # Streaming Task
//!
//! The single task that owns a decoder and drives it.
//!
//! ## Architecture
//!
//! Every mutating operation runs on this task. Control handles talk to it
//! over a bounded command channel and read its state from a `watch`
//! snapshot, so there is never more than one operation touching the decoder,
//! the clock or the loop state at a time.
//!
//! ```text
//!   EngineHandle ──Command──> ┌─────────────────────────────┐
//!        ▲                    │        StreamingTask        │
//!        │   EngineStatus     │                             │
//!        └────(watch)──────── │  load ──> decode ──> push ──┼──> OutputSink
//!                             │    ▲         │              │
//!                             │    └─ loop ──┘              │
//!                             └─────────────────────────────┘
//!                                         │ CoreEvent
//!                                         ▼
//!                                      EventBus
//! ```
//!
//! Commands are drained between iterations, so no decode is ever in flight
//! while a seek, subsong switch or loop-count change is handled. While paused
//! the task just waits for the next command.
//!
//! ## Task States
//!
//! - `NotStarted`: push mode, waiting for the source to complete
//! - `Running`: decoding
//! - `Paused`: end of media, a refused buffer, a failed seek or a failed load
//! - `Stopped`: cancelled or every handle dropped

use crate::allocation::AllocationNegotiator;
use crate::clock::{ClockTime, PlaybackClock};
use crate::config::{EngineConfig, EngineStatus, PlaybackStats, TaskState};
use crate::error::{PlaybackError, Result};
use crate::format::OutputTemplate;
use crate::loop_signal::LoopState;
use crate::seek::SeekCoordinator;
use crate::segment::SeekRequest;
use crate::source::{PushAccumulator, SourceLoader};
use crate::traits::{
    DecodeContext, DecodedChunk, DecoderCapabilities, DownstreamEvent, FlowError, LoadContext,
    NonstreamDecoder, OutputSink,
};
use bridge_traits::source::{SchedulingMode, UpstreamSource};
use bytes::Bytes;
use core_runtime::events::{AlertEvent, CoreEvent, EventBus, PlaybackEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

// ============================================================================
// Commands
// ============================================================================

/// Requests from control handles, processed between decode iterations.
#[derive(Debug)]
pub(crate) enum Command {
    Seek {
        request: SeekRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    SetNumLoops {
        count: i32,
        reply: oneshot::Sender<Result<()>>,
    },
    NumLoops {
        reply: oneshot::Sender<i32>,
    },
    SetSubsong {
        index: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    CurrentSubsong {
        reply: oneshot::Sender<u32>,
    },
    QueryPosition {
        reply: oneshot::Sender<Result<ClockTime>>,
    },
    PushChunk {
        data: Bytes,
    },
    EndOfInput,
    Resume,
}

/// State owned by the task that is not part of the clock or the loop state.
#[derive(Debug, Clone, Default)]
struct PlaybackState {
    loaded: bool,
    load_failed: bool,
    duration: Option<ClockTime>,
    current_subsong: u32,
    num_subsongs: u32,
}

/// Everything the task needs, assembled by the engine builder.
pub(crate) struct TaskParts {
    pub engine_id: String,
    pub decoder: Box<dyn NonstreamDecoder>,
    pub capabilities: DecoderCapabilities,
    pub has_loop_control: bool,
    pub has_subsong_control: bool,
    pub template: OutputTemplate,
    pub sink: Arc<dyn OutputSink>,
    pub source: Arc<dyn UpstreamSource>,
    pub config: EngineConfig,
    pub events: EventBus,
    pub negotiator: AllocationNegotiator,
    pub commands: mpsc::Receiver<Command>,
    pub status: watch::Sender<EngineStatus>,
    pub cancel: CancellationToken,
}

// ============================================================================
// StreamingTask
// ============================================================================

pub(crate) struct StreamingTask {
    engine_id: String,
    decoder: Box<dyn NonstreamDecoder>,
    capabilities: DecoderCapabilities,
    has_loop_control: bool,
    has_subsong_control: bool,
    template: OutputTemplate,
    sink: Arc<dyn OutputSink>,
    source: Arc<dyn UpstreamSource>,
    config: EngineConfig,
    events: EventBus,
    negotiator: AllocationNegotiator,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<EngineStatus>,
    cancel: CancellationToken,

    clock: PlaybackClock,
    loops: LoopState,
    seeker: SeekCoordinator,
    state: PlaybackState,
    accumulator: Option<PushAccumulator>,
    task_state: TaskState,
    stats: PlaybackStats,
    discont_pending: bool,
}

impl StreamingTask {
    pub(crate) fn new(parts: TaskParts) -> Self {
        let loops = LoopState::new(parts.config.num_loops);
        let state = PlaybackState {
            current_subsong: parts.config.initial_subsong,
            ..Default::default()
        };

        Self {
            engine_id: parts.engine_id,
            decoder: parts.decoder,
            capabilities: parts.capabilities,
            has_loop_control: parts.has_loop_control,
            has_subsong_control: parts.has_subsong_control,
            template: parts.template,
            sink: parts.sink,
            source: parts.source,
            config: parts.config,
            events: parts.events,
            negotiator: parts.negotiator,
            commands: parts.commands,
            status: parts.status,
            cancel: parts.cancel,
            clock: PlaybackClock::new(),
            loops,
            seeker: SeekCoordinator::new(),
            state,
            accumulator: None,
            task_state: TaskState::NotStarted,
            stats: PlaybackStats::default(),
            discont_pending: false,
        }
    }

    /// Drive the engine until cancelled or every handle is dropped.
    #[instrument(skip(self), fields(engine_id = %self.engine_id))]
    pub(crate) async fn run(mut self) {
        let cancel = self.cancel.clone();
        info!(source = %self.source.describe(), "Streaming task started");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = self.main_loop() => {}
        }

        self.task_state = TaskState::Stopped;
        self.publish();
        info!(
            buffers = self.stats.buffers_pushed,
            samples = self.stats.samples_pushed,
            loops = self.stats.loops,
            "Streaming task stopped"
        );
    }

    async fn main_loop(&mut self) {
        match self.source.scheduling() {
            SchedulingMode::Pull => {
                self.set_task_state(TaskState::Running, "pull activation");
                self.load_pull().await;
            }
            SchedulingMode::Push => {
                let expected = self.source.byte_length().await;
                debug!(?expected, "Push activation, waiting for data");
                self.accumulator = Some(PushAccumulator::new(expected));
            }
        }
        self.publish();

        loop {
            while let Ok(command) = self.commands.try_recv() {
                self.handle_command(command).await;
            }

            if self.task_state == TaskState::Running && self.state.loaded {
                self.iterate().await;
                self.publish();
                // Keep control handles and other tasks responsive
                tokio::task::yield_now().await;
                continue;
            }

            match self.commands.recv().await {
                Some(command) => self.handle_command(command).await,
                None => {
                    debug!("All handles dropped");
                    return;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    async fn load_pull(&mut self) {
        match SourceLoader::load_pull(self.source.as_ref()).await {
            Ok(data) => self.load(data).await,
            Err(e) => self.fail_load(e),
        }
    }

    async fn load(&mut self, data: Bytes) {
        if self.state.loaded || self.state.load_failed {
            debug!("Ignoring data after load");
            return;
        }

        let (preferred_rate, preferred_channels) = self
            .sink
            .preferred_format()
            .resolve(self.config.default_sample_rate, self.config.default_channels);
        let ctx = LoadContext {
            preferred_rate,
            preferred_channels,
            initial_subsong: self.state.current_subsong,
            num_loops: self.loops.requested(),
        };

        self.stats.bytes_loaded = data.len() as u64;
        let format = match self.decoder.load(data, &ctx).await {
            Ok(format) => format,
            Err(e) => return self.fail_load(e),
        };

        if !self.template.accepts(&format.info) {
            return self.fail_load(PlaybackError::InvalidOutputFormat(format.info.to_string()));
        }

        self.state.loaded = true;
        self.state.duration = format.duration;
        self.state.num_subsongs = format.num_subsongs;
        if let Some(control) = self.decoder.subsong_control() {
            self.state.current_subsong = control.current_subsong();
        }

        self.clock.set_info(format.info);
        self.clock.reset(format.duration);
        self.negotiator.mark_format_changed();
        self.loops.reset();

        info!(
            format = %format.info,
            duration = ?format.duration,
            num_subsongs = format.num_subsongs,
            "Loaded"
        );

        self.sink
            .send_event(DownstreamEvent::Segment(self.clock.segment().clone()));
        if !format.metadata.is_empty() {
            self.sink
                .send_event(DownstreamEvent::Tags(format.metadata.clone()));
            self.emit(CoreEvent::Playback(PlaybackEvent::Tags {
                engine_id: self.engine_id.clone(),
                title: format.metadata.title.clone(),
                comment: format.metadata.comment.clone(),
            }));
        }
        self.emit(CoreEvent::Playback(PlaybackEvent::Loaded {
            engine_id: self.engine_id.clone(),
            duration_ns: format.duration,
            num_subsongs: format.num_subsongs,
        }));

        self.set_task_state(TaskState::Running, "loaded");
    }

    fn fail_load(&mut self, error: PlaybackError) {
        error!(error = %error, "Load failed");
        self.state.load_failed = true;
        self.emit(CoreEvent::Alert(AlertEvent::Error {
            engine_id: self.engine_id.clone(),
            message: error.to_string(),
            fatal: true,
        }));
        self.set_task_state(TaskState::Paused, "load failed");
    }

    // ------------------------------------------------------------------------
    // Decode iteration
    // ------------------------------------------------------------------------

    async fn iterate(&mut self) {
        if self.loops.signal().take() {
            self.apply_pending_loop();
        }

        let result = {
            let mut ctx = DecodeContext::new(
                &mut self.negotiator,
                self.sink.as_ref(),
                &mut self.clock,
                &self.template,
                &mut self.loops,
                self.config.samples_per_buffer,
            );
            self.decoder.decode(&mut ctx).await
        };
        self.stats.negotiations = self.negotiator.negotiations();

        match result {
            Ok(Some(chunk)) => self.push(chunk).await,
            Ok(None) => {
                info!("End of media");
                self.sink.send_event(DownstreamEvent::Eos);
                self.emit(CoreEvent::Playback(PlaybackEvent::EndOfMedia {
                    engine_id: self.engine_id.clone(),
                }));
                self.set_task_state(TaskState::Paused, "end of media");
            }
            Err(PlaybackError::NegotiationFailed(reason)) => {
                warn!(%reason, "Negotiation failed, no buffer produced");
                self.set_task_state(TaskState::Paused, "not negotiated");
            }
            Err(e) => {
                error!(error = %e, "Decoding failed");
                self.emit(CoreEvent::Alert(AlertEvent::Error {
                    engine_id: self.engine_id.clone(),
                    message: e.to_string(),
                    fatal: false,
                }));
                self.set_task_state(TaskState::Paused, "decoding error");
            }
        }
    }

    /// The decoder looped during the previous iteration; announce the jump
    /// before the next buffer goes out.
    fn apply_pending_loop(&mut self) {
        let position = self.decoder.tell();
        let segment = self.clock.apply_loop(position);

        debug!(position, count = self.loops.counter(), "Applying loop");
        self.sink
            .send_event(DownstreamEvent::Discontinuity { position });
        self.sink.send_event(DownstreamEvent::Segment(segment));
        self.discont_pending = true;
        self.stats.loops += 1;

        self.emit(CoreEvent::Playback(PlaybackEvent::LoopBoundary {
            engine_id: self.engine_id.clone(),
            count: self.loops.counter(),
            position_ns: position,
        }));
    }

    async fn push(&mut self, chunk: DecodedChunk) {
        let info = match self.clock.info() {
            Some(info) => *info,
            None => return self.set_task_state(TaskState::Paused, "no output format"),
        };

        // Output format changed during decode or downstream asked to reconfigure
        if let Err(e) = self.negotiator.ensure(&info, self.sink.as_ref()) {
            warn!(error = %e, "Renegotiation failed, dropping buffer");
            self.stats.negotiations = self.negotiator.negotiations();
            return self.set_task_state(TaskState::Paused, "not negotiated");
        }
        self.stats.negotiations = self.negotiator.negotiations();

        let DecodedChunk { mut buffer, samples } = chunk;
        buffer.set_timing(self.clock.stamp(samples));
        if self.discont_pending {
            buffer.set_discont(true);
            self.discont_pending = false;
        }

        trace!(
            pts = buffer.pts(),
            duration = buffer.duration(),
            offset = buffer.offset(),
            samples,
            "Pushing buffer"
        );

        match self.sink.push(buffer).await {
            Ok(()) => {
                self.stats.buffers_pushed += 1;
                self.stats.samples_pushed += samples;
            }
            Err(flow) => self.handle_flow_error(flow),
        }
    }

    fn handle_flow_error(&mut self, flow: FlowError) {
        self.stats.flow_errors += 1;

        if flow.is_genuine_failure() {
            error!(flow = %flow, "Downstream refused buffer");
            self.emit(CoreEvent::Alert(AlertEvent::Error {
                engine_id: self.engine_id.clone(),
                message: format!("streaming stopped, reason: {}", flow),
                fatal: false,
            }));
        } else {
            debug!(flow = %flow, "Pausing on downstream flow return");
        }

        self.set_task_state(TaskState::Paused, &flow.to_string());
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        trace!(?command, "Handling command");

        // Status is published before replying so callers observe the effect
        match command {
            Command::Seek { request, reply } => {
                let result = self.handle_seek(request).await;
                self.publish();
                let _ = reply.send(result);
            }
            Command::SetNumLoops { count, reply } => {
                let result = self.handle_set_num_loops(count);
                self.publish();
                let _ = reply.send(result);
            }
            Command::NumLoops { reply } => {
                let _ = reply.send(self.loops.requested());
            }
            Command::SetSubsong { index, reply } => {
                let result = self.handle_set_subsong(index);
                self.publish();
                let _ = reply.send(result);
            }
            Command::CurrentSubsong { reply } => {
                let current = match self.decoder.subsong_control() {
                    Some(control) if self.state.loaded => control.current_subsong(),
                    _ => self.state.current_subsong,
                };
                let _ = reply.send(current);
            }
            Command::QueryPosition { reply } => {
                let _ = reply.send(self.position());
            }
            Command::PushChunk { data } => {
                self.handle_push_chunk(data).await;
                self.publish();
            }
            Command::EndOfInput => {
                self.handle_end_of_input().await;
                self.publish();
            }
            Command::Resume => {
                if self.state.loaded && self.task_state == TaskState::Paused {
                    self.set_task_state(TaskState::Running, "resume requested");
                    self.publish();
                }
            }
        }
    }

    #[instrument(skip(self), fields(engine_id = %self.engine_id))]
    async fn handle_seek(&mut self, request: SeekRequest) -> Result<()> {
        let flush = request.flags.flush;

        let result = match SeekCoordinator::check_entry(&self.snapshot(), &request) {
            Ok(()) => {
                let current = self.clock.position();
                self.seeker
                    .perform(&request, self.decoder.as_mut(), &mut self.clock, current)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(segment) => {
                self.loops.reset();
                self.discont_pending = true;
                self.stats.seeks += 1;

                if request.flags.segment {
                    self.emit(CoreEvent::Playback(PlaybackEvent::SegmentStart {
                        engine_id: self.engine_id.clone(),
                        position_ns: segment.start,
                    }));
                }
                if flush {
                    self.sink.send_event(DownstreamEvent::FlushStop);
                }
                self.sink.send_event(DownstreamEvent::Segment(segment));

                self.set_task_state(TaskState::Running, "seek done");
                Ok(())
            }
            Err(e) => {
                if flush {
                    self.sink.send_event(DownstreamEvent::FlushStop);
                }
                self.stats.failed_seeks += 1;
                self.emit(CoreEvent::Alert(AlertEvent::Warning {
                    engine_id: self.engine_id.clone(),
                    message: format!("seek failed: {}", e),
                }));
                if self.state.loaded {
                    self.set_task_state(TaskState::Paused, "seek failed");
                }
                Err(e)
            }
        }
    }

    fn handle_set_num_loops(&mut self, count: i32) -> Result<()> {
        let mut count = count;
        if self.has_loop_control {
            if let Some(control) = self.decoder.loop_control() {
                control.set_num_loops(count)?;
                // The decoder may only support a subset of loop counts
                count = control.num_loops();
            }
        }

        self.loops.set_num_loops(count);
        debug!(count, counter = self.loops.counter(), "Loop count changed");
        Ok(())
    }

    fn handle_set_subsong(&mut self, index: u32) -> Result<()> {
        if !self.has_subsong_control {
            return Err(PlaybackError::CapabilityMissing(
                "subsong control".to_string(),
            ));
        }

        if !self.state.loaded {
            // Remembered and handed to the decoder at load time
            self.state.current_subsong = index;
            return Ok(());
        }

        let count = self.state.num_subsongs;
        if index >= count {
            warn!(index, count, "Ignoring out-of-range subsong");
            return Err(PlaybackError::InvalidSubsong { index, count });
        }

        let control = self
            .decoder
            .subsong_control()
            .ok_or_else(|| PlaybackError::CapabilityMissing("subsong control".to_string()))?;
        let duration = control.set_current_subsong(index)?;

        self.state.current_subsong = index;
        self.state.duration = duration;
        self.clock.reset(duration);
        self.loops.reset();
        self.discont_pending = true;

        self.sink.send_event(DownstreamEvent::FlushStart);
        self.sink.send_event(DownstreamEvent::FlushStop);
        self.sink
            .send_event(DownstreamEvent::Segment(self.clock.segment().clone()));

        info!(index, duration = ?duration, "Switched subsong");
        self.emit(CoreEvent::Playback(PlaybackEvent::SubsongChanged {
            engine_id: self.engine_id.clone(),
            index,
            duration_ns: duration,
        }));

        self.set_task_state(TaskState::Running, "subsong switched");
        Ok(())
    }

    fn position(&self) -> Result<ClockTime> {
        if !self.state.loaded {
            return Err(PlaybackError::NotLoaded);
        }
        if !self.capabilities.can_tell {
            return Err(PlaybackError::CapabilityMissing("tell".to_string()));
        }
        Ok(self.decoder.tell())
    }

    async fn handle_push_chunk(&mut self, data: Bytes) {
        let Some(accumulator) = self.accumulator.as_mut() else {
            debug!("Ignoring pushed data in pull mode");
            return;
        };

        if let Some(complete) = accumulator.push_chunk(data) {
            info!(bytes = complete.len(), "Push source complete");
            self.load(complete).await;
        }
    }

    async fn handle_end_of_input(&mut self) {
        let Some(accumulator) = self.accumulator.as_mut() else {
            return;
        };
        if accumulator.is_complete() {
            return;
        }

        match accumulator.finish() {
            Ok(data) => {
                info!(bytes = data.len(), "End of input, loading accumulated data");
                self.load(data).await;
            }
            Err(e) => self.fail_load(e),
        }
    }

    // ------------------------------------------------------------------------
    // State publication
    // ------------------------------------------------------------------------

    fn set_task_state(&mut self, state: TaskState, reason: &str) {
        if self.task_state == state {
            return;
        }
        let previous = self.task_state;
        self.task_state = state;
        debug!(from = ?previous, to = ?state, reason, "Task state changed");

        match state {
            TaskState::Paused => self.emit(CoreEvent::Playback(PlaybackEvent::Paused {
                engine_id: self.engine_id.clone(),
                reason: reason.to_string(),
            })),
            TaskState::Running if previous == TaskState::Paused => {
                self.emit(CoreEvent::Playback(PlaybackEvent::Resumed {
                    engine_id: self.engine_id.clone(),
                }))
            }
            _ => {}
        }
    }

    fn snapshot(&self) -> EngineStatus {
        let segment = self.clock.segment();
        EngineStatus {
            loaded: self.state.loaded,
            load_failed: self.state.load_failed,
            duration: self.state.duration,
            num_subsongs: self.state.num_subsongs,
            current_subsong: self.state.current_subsong,
            num_loops: self.loops.requested(),
            task_state: self.task_state,
            audio_info: self.clock.info().copied(),
            can_seek: self.capabilities.can_seek,
            can_tell: self.capabilities.can_tell,
            segment_start: segment.start,
            segment_stop: segment.stop,
            stats: self.stats.clone(),
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.snapshot());
    }

    fn emit(&self, event: CoreEvent) {
        // Nobody listening is fine
        let _ = self.events.emit(event);
    }
}
