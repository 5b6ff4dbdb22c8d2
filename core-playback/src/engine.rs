//! # Engine
//!
//! Construction and control surface of a non-stream playback engine.
//!
//! ```ignore
//! let engine = NonstreamEngine::builder()
//!     .decoder(Box::new(ToneDecoder::new()))
//!     .sink(sink)
//!     .config(EngineConfig::default())
//!     .build()?;
//!
//! let handle = engine.activate(Arc::new(FileSource::open("song.tone").await?))?;
//! handle.seek(SeekRequest::to_position(2 * SECOND)).await?;
//! handle.set_num_loops(-1).await?;
//! ```
//!
//! An engine is single-use: it loads one source. [`NonstreamEngine::activate`]
//! moves the decoder into a spawned streaming task and
//! returns an [`EngineHandle`] that talks to it.

use crate::allocation::{AllocationDecider, AllocationNegotiator, DefaultAllocationDecider};
use crate::clock::ClockTime;
use crate::config::{EngineConfig, EngineStatus, PlaybackStats};
use crate::error::{PlaybackError, Result};
use crate::format::OutputTemplate;
use crate::seek::SeekCoordinator;
use crate::segment::SeekRequest;
use crate::streaming::{Command, StreamingTask, TaskParts};
use crate::traits::{DecoderCapabilities, DownstreamEvent, NonstreamDecoder, OutputSink};
use bridge_traits::source::UpstreamSource;
use bytes::Bytes;
use core_runtime::events::{AlertEvent, CoreEvent, EventBus, EventStream};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Answer to a seeking query: the range a seek may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekingInfo {
    pub start: ClockTime,
    pub stop: Option<ClockTime>,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`NonstreamEngine`].
#[derive(Default)]
pub struct NonstreamEngineBuilder {
    decoder: Option<Box<dyn NonstreamDecoder>>,
    sink: Option<Arc<dyn OutputSink>>,
    config: Option<EngineConfig>,
    events: Option<EventBus>,
    decider: Option<Arc<dyn AllocationDecider>>,
}

impl NonstreamEngineBuilder {
    pub fn decoder(mut self, decoder: Box<dyn NonstreamDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share an existing bus. A private one sized from the config is created
    /// otherwise.
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Override how allocator offers from downstream are chosen.
    pub fn allocation_decider(mut self, decider: Arc<dyn AllocationDecider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Validate the configuration and probe the decoder's capabilities.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::InvalidConfig`] when the decoder or sink is missing or
    /// a config value is out of range.
    pub fn build(self) -> Result<NonstreamEngine> {
        let mut decoder = self
            .decoder
            .ok_or_else(|| PlaybackError::InvalidConfig("a decoder is required".to_string()))?;
        let sink = self
            .sink
            .ok_or_else(|| PlaybackError::InvalidConfig("a sink is required".to_string()))?;

        let config = self.config.unwrap_or_default();
        config.validate().map_err(PlaybackError::InvalidConfig)?;

        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(config.event_buffer_size));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultAllocationDecider));

        let capabilities = decoder.capabilities();
        let has_loop_control = decoder.loop_control().is_some();
        let has_subsong_control = decoder.subsong_control().is_some();
        let template = decoder.output_template();

        let id = Uuid::new_v4().to_string();
        debug!(
            engine_id = %id,
            can_seek = capabilities.can_seek,
            can_tell = capabilities.can_tell,
            has_loop_control,
            has_subsong_control,
            "Engine built"
        );

        Ok(NonstreamEngine {
            id,
            decoder,
            capabilities,
            has_loop_control,
            has_subsong_control,
            template,
            sink,
            config,
            events,
            decider,
        })
    }
}

// ============================================================================
// Engine
// ============================================================================

/// A configured engine that has not been connected to a source yet.
pub struct NonstreamEngine {
    id: String,
    decoder: Box<dyn NonstreamDecoder>,
    capabilities: DecoderCapabilities,
    has_loop_control: bool,
    has_subsong_control: bool,
    template: OutputTemplate,
    sink: Arc<dyn OutputSink>,
    config: EngineConfig,
    events: EventBus,
    decider: Arc<dyn AllocationDecider>,
}

impl NonstreamEngine {
    pub fn builder() -> NonstreamEngineBuilder {
        NonstreamEngineBuilder::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capabilities(&self) -> DecoderCapabilities {
        self.capabilities
    }

    pub fn has_loop_control(&self) -> bool {
        self.has_loop_control
    }

    pub fn has_subsong_control(&self) -> bool {
        self.has_subsong_control
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Connect to `source` and start the driving task.
    ///
    /// Pull-capable sources are fetched in full right away; push-only
    /// sources are fed through [`EngineHandle::push_chunk`].
    ///
    /// # Errors
    ///
    /// [`PlaybackError::Internal`] when called outside a tokio runtime.
    pub fn activate(self, source: Arc<dyn UpstreamSource>) -> Result<EngineHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PlaybackError::Internal(format!("no tokio runtime: {}", e)))?;

        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity);
        let (status_tx, status_rx) = watch::channel(EngineStatus::new(
            &self.config,
            self.capabilities.can_seek,
            self.capabilities.can_tell,
        ));
        let cancel = CancellationToken::new();

        info!(
            engine_id = %self.id,
            source = %source.describe(),
            scheduling = ?source.scheduling(),
            "Activating engine"
        );

        let task = StreamingTask::new(TaskParts {
            engine_id: self.id.clone(),
            decoder: self.decoder,
            capabilities: self.capabilities,
            has_loop_control: self.has_loop_control,
            has_subsong_control: self.has_subsong_control,
            template: self.template,
            sink: Arc::clone(&self.sink),
            source,
            config: self.config,
            events: self.events.clone(),
            negotiator: AllocationNegotiator::new(self.decider),
            commands: command_rx,
            status: status_tx,
            cancel: cancel.clone(),
        });
        let join = runtime.spawn(task.run());

        Ok(EngineHandle {
            engine_id: self.id,
            commands: command_tx,
            status: status_rx,
            sink: self.sink,
            events: self.events,
            cancel,
            join: Mutex::new(Some(join)),
        })
    }
}

impl fmt::Debug for NonstreamEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonstreamEngine")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("has_loop_control", &self.has_loop_control)
            .field("has_subsong_control", &self.has_subsong_control)
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Control surface of a running engine.
///
/// Dropping the handle stops the driving task.
pub struct EngineHandle {
    engine_id: String,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<EngineStatus>,
    sink: Arc<dyn OutputSink>,
    events: EventBus,
    cancel: CancellationToken,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl EngineHandle {
    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    /// Seek within the current subsong.
    ///
    /// Requests that cannot succeed (wrong format, nothing loaded, decoder
    /// cannot seek) are refused here, before downstream is flushed.
    ///
    /// # Errors
    ///
    /// Any seek failure; a `Warning` alert is posted as well. A request
    /// refused here leaves playback untouched. One that fails inside the
    /// driving task (decoder rejection, stop before start, bad rate) keeps the
    /// previous segment and position but leaves the task `Paused`, even if it
    /// was running; call [`resume`](Self::resume) to continue.
    pub async fn seek(&self, request: SeekRequest) -> Result<()> {
        if let Err(e) = SeekCoordinator::check_entry(&self.status(), &request) {
            warn!(engine_id = %self.engine_id, error = %e, "Seek refused");
            let _ = self.events.emit(CoreEvent::Alert(AlertEvent::Warning {
                engine_id: self.engine_id.clone(),
                message: format!("seek failed: {}", e),
            }));
            return Err(e);
        }

        if request.flags.flush {
            // Unblocks a pending push before the task picks up the command
            self.sink.send_event(DownstreamEvent::FlushStart);
        }

        self.request(|reply| Command::Seek { request, reply })
            .await?
    }

    /// `n < 0` loops forever, `0` plays once, `n > 0` loops `n` times.
    pub async fn set_num_loops(&self, count: i32) -> Result<()> {
        self.request(|reply| Command::SetNumLoops { count, reply })
            .await?
    }

    pub async fn num_loops(&self) -> Result<i32> {
        self.request(|reply| Command::NumLoops { reply }).await
    }

    /// Switch subsongs. Before load the index is kept and applied at load.
    pub async fn set_current_subsong(&self, index: u32) -> Result<()> {
        self.request(|reply| Command::SetSubsong { index, reply })
            .await?
    }

    pub async fn current_subsong(&self) -> Result<u32> {
        self.request(|reply| Command::CurrentSubsong { reply })
            .await
    }

    /// Number of subsongs in the loaded media, 0 before load.
    pub fn num_subsongs(&self) -> u32 {
        self.status.borrow().num_subsongs
    }

    /// Position within the current subsong, as reported by the decoder.
    pub async fn query_position(&self) -> Result<ClockTime> {
        self.request(|reply| Command::QueryPosition { reply })
            .await?
    }

    /// Duration of the current subsong, when known.
    pub fn query_duration(&self) -> Option<ClockTime> {
        self.status.borrow().duration
    }

    /// Seekable range, `None` when nothing is loaded or seeking is unsupported.
    pub fn query_seeking(&self) -> Option<SeekingInfo> {
        let status = self.status.borrow();
        if !status.loaded || !status.can_seek {
            return None;
        }
        Some(SeekingInfo {
            start: status.segment_start,
            stop: status.segment_stop,
        })
    }

    /// Feed data from a push-only source. Ignored once loaded.
    pub async fn push_chunk(&self, data: Bytes) -> Result<()> {
        self.send(Command::PushChunk { data }).await
    }

    /// The push-only source has no more data.
    pub async fn end_of_input(&self) -> Result<()> {
        self.send(Command::EndOfInput).await
    }

    /// Restart a paused task.
    pub async fn resume(&self) -> Result<()> {
        self.send(Command::Resume).await
    }

    /// Latest published status.
    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    pub fn stats(&self) -> PlaybackStats {
        self.status.borrow().stats.clone()
    }

    /// Wait until the published status satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::EngineStopped`] if the task ends first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<EngineStatus>
    where
        F: FnMut(&EngineStatus) -> bool,
    {
        let mut status = self.status.clone();
        let reached = status
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| PlaybackError::EngineStopped)?;
        Ok((*reached).clone())
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Stop the driving task and wait for it to finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        let join = self.join.lock().take();
        if let Some(join) = join {
            join.await
                .map_err(|e| PlaybackError::Internal(format!("streaming task failed: {}", e)))?;
        }
        info!(engine_id = %self.engine_id, "Engine shut down");
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PlaybackError::EngineStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply)).await?;
        response.await.map_err(|_| PlaybackError::EngineStopped)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine_id", &self.engine_id)
            .field("status", &*self.status.borrow())
            .finish()
    }
}
