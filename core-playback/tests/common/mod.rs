//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::MemorySource;
use core_playback::decoder::{ToneDecoder, ToneSheet, ToneSubsong};
use bytes::Bytes;
use core_playback::{
    AudioCaps, AudioInfo, ClockTime, DecodeContext, DecodedChunk, DownstreamEvent,
    DownstreamFormat, EngineConfig, EngineHandle, EngineStatus, FlowError, FormatInfo,
    LoadContext, LoopControl, NonstreamDecoder, NonstreamEngine, OutputBuffer, OutputSink,
    TaskState,
};
use core_runtime::events::{CoreEvent, EventStream};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// What a buffer looked like when it reached the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedBuffer {
    pub pts: ClockTime,
    pub duration: ClockTime,
    pub offset: u64,
    pub offset_end: u64,
    pub size: usize,
    pub discont: bool,
    pub allocator: String,
}

impl PushedBuffer {
    pub fn frames(&self) -> u64 {
        self.offset_end - self.offset
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Buffer(PushedBuffer),
    Event(DownstreamEvent),
}

/// Sink that remembers everything and behaves like a real downstream
/// around flushes.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Record>>,
    caps: Mutex<Vec<AudioCaps>>,
    flushing: AtomicBool,
    accept_limit: Mutex<Option<usize>>,
    refusal: Mutex<Option<FlowError>>,
    preferred: Mutex<DownstreamFormat>,
    allocation_queries: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Accept at most `limit` buffers, then answer `Eos`.
    pub fn with_limit(limit: usize) -> Arc<Self> {
        let sink = Self::default();
        *sink.accept_limit.lock() = Some(limit);
        Arc::new(sink)
    }

    pub fn with_preferred(rate: u32, channels: u16) -> Arc<Self> {
        let sink = Self::default();
        *sink.preferred.lock() = DownstreamFormat::new(Some(rate), Some(channels));
        Arc::new(sink)
    }

    pub fn refuse_with(&self, flow: Option<FlowError>) {
        *self.refusal.lock() = flow;
    }

    pub fn raise_limit(&self, limit: Option<usize>) {
        *self.accept_limit.lock() = limit;
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn buffers(&self) -> Vec<PushedBuffer> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                Record::Buffer(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<DownstreamEvent> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                Record::Event(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn total_frames(&self) -> u64 {
        self.buffers().iter().map(PushedBuffer::frames).sum()
    }

    pub fn caps(&self) -> Vec<AudioCaps> {
        self.caps.lock().clone()
    }

    pub fn allocation_queries(&self) -> usize {
        self.allocation_queries.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn push(&self, buffer: OutputBuffer) -> Result<(), FlowError> {
        if self.flushing.load(Ordering::SeqCst) {
            return Err(FlowError::Flushing);
        }
        if let Some(flow) = self.refusal.lock().clone() {
            return Err(flow);
        }

        let mut records = self.records.lock();
        let accepted = records
            .iter()
            .filter(|r| matches!(r, Record::Buffer(_)))
            .count();
        if matches!(*self.accept_limit.lock(), Some(limit) if accepted >= limit) {
            return Err(FlowError::Eos);
        }

        records.push(Record::Buffer(PushedBuffer {
            pts: buffer.pts(),
            duration: buffer.duration(),
            offset: buffer.offset(),
            offset_end: buffer.offset_end(),
            size: buffer.size(),
            discont: buffer.is_discont(),
            allocator: buffer.allocator_name().to_string(),
        }));
        Ok(())
    }

    fn send_event(&self, event: DownstreamEvent) -> bool {
        match event {
            DownstreamEvent::FlushStart => self.flushing.store(true, Ordering::SeqCst),
            DownstreamEvent::FlushStop => self.flushing.store(false, Ordering::SeqCst),
            _ => {}
        }
        self.records.lock().push(Record::Event(event));
        true
    }

    fn set_caps(&self, caps: &AudioCaps) -> bool {
        self.caps.lock().push(caps.clone());
        true
    }

    fn query_allocation(&self, _query: &mut core_playback::AllocationQuery) -> bool {
        self.allocation_queries.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn preferred_format(&self) -> DownstreamFormat {
        *self.preferred.lock()
    }
}

/// 4096 frames looping over 1024..2048, plus a one-second plain subsong.
pub fn looping_sheet() -> ToneSheet {
    ToneSheet::new(48_000, 2)
        .with_title("Unreal Theme")
        .with_comment("two subsongs")
        .subsong(ToneSubsong::new(4096, 440).with_loop(1024, 2048))
        .subsong(ToneSubsong::new(48_000, 220))
}

/// Ten seconds that loop as a whole, so boundaries are rare.
pub fn long_loop_sheet() -> ToneSheet {
    ToneSheet::new(48_000, 2).subsong(ToneSubsong::new(480_000, 330).with_loop(0, 480_000))
}

pub fn config(num_loops: i32) -> EngineConfig {
    EngineConfig {
        num_loops,
        samples_per_buffer: 512,
        ..EngineConfig::default()
    }
}

/// Build and activate a tone engine reading `sheet` in pull mode.
pub fn start(
    sheet: &ToneSheet,
    sink: Arc<RecordingSink>,
    config: EngineConfig,
) -> (EngineHandle, EventStream) {
    start_with_source(Arc::new(MemorySource::new(sheet.to_bytes())), sink, config)
}

pub fn start_with_source(
    source: Arc<MemorySource>,
    sink: Arc<RecordingSink>,
    config: EngineConfig,
) -> (EngineHandle, EventStream) {
    start_with_decoder(Box::new(ToneDecoder::new()), source, sink, config)
}

pub fn start_with_decoder(
    decoder: Box<dyn NonstreamDecoder>,
    source: Arc<MemorySource>,
    sink: Arc<RecordingSink>,
    config: EngineConfig,
) -> (EngineHandle, EventStream) {
    let engine = NonstreamEngine::builder()
        .decoder(decoder)
        .sink(sink)
        .config(config)
        .build()
        .expect("engine builds");
    let events = EventStream::new(engine.events().subscribe());
    let handle = engine.activate(source).expect("engine activates");
    (handle, events)
}

/// Scripted decoder that renders fixed-size buffers and changes its output
/// format once, part way through.
///
/// It also takes loop counts, keeping at most `max_loops` of them.
pub struct SwitchingDecoder {
    first: AudioInfo,
    second: AudioInfo,
    switch_after: u32,
    total: u32,
    frames_per_buffer: usize,
    rendered: u32,
    max_loops: i32,
    num_loops: i32,
    requested_loops: Arc<Mutex<Vec<i32>>>,
}

impl SwitchingDecoder {
    pub fn new(first: AudioInfo, second: AudioInfo, switch_after: u32, total: u32) -> Self {
        Self {
            first,
            second,
            switch_after,
            total,
            frames_per_buffer: 480,
            rendered: 0,
            max_loops: i32::MAX,
            num_loops: 0,
            requested_loops: Arc::default(),
        }
    }

    pub fn with_max_loops(mut self, max_loops: i32) -> Self {
        self.max_loops = max_loops;
        self
    }

    /// Every count the engine forwarded.
    pub fn requested_loops(&self) -> Arc<Mutex<Vec<i32>>> {
        self.requested_loops.clone()
    }
}

#[async_trait]
impl NonstreamDecoder for SwitchingDecoder {
    async fn load(&mut self, _data: Bytes, _ctx: &LoadContext) -> core_playback::Result<FormatInfo> {
        Ok(FormatInfo::new(self.first, None))
    }

    async fn decode(
        &mut self,
        ctx: &mut DecodeContext<'_>,
    ) -> core_playback::Result<Option<DecodedChunk>> {
        if self.rendered >= self.total {
            return Ok(None);
        }
        if self.rendered == self.switch_after {
            ctx.set_output_format(self.second)?;
        }

        let info = if self.rendered < self.switch_after {
            self.first
        } else {
            self.second
        };
        let buffer = ctx.allocate(info.frames_to_bytes(self.frames_per_buffer))?;
        self.rendered += 1;
        Ok(Some(DecodedChunk::new(buffer, self.frames_per_buffer as u64)))
    }

    async fn seek(&mut self, _position: ClockTime) -> core_playback::Result<()> {
        Ok(())
    }

    fn tell(&self) -> ClockTime {
        0
    }

    fn loop_control(&mut self) -> Option<&mut dyn LoopControl> {
        Some(self)
    }
}

impl LoopControl for SwitchingDecoder {
    fn set_num_loops(&mut self, n: i32) -> core_playback::Result<()> {
        self.requested_loops.lock().push(n);
        self.num_loops = n.min(self.max_loops);
        Ok(())
    }

    fn num_loops(&self) -> i32 {
        self.num_loops
    }
}

/// Wait until the task pauses (end of media, refusal or failure).
pub async fn wait_paused(handle: &EngineHandle) -> EngineStatus {
    wait_until(handle, |s| s.task_state == TaskState::Paused).await
}

pub async fn wait_until<F>(handle: &EngineHandle, predicate: F) -> EngineStatus
where
    F: FnMut(&EngineStatus) -> bool,
{
    tokio::time::timeout(TIMEOUT, handle.wait_for(predicate))
        .await
        .expect("status reached before timeout")
        .expect("engine still running")
}

/// Next event matching `predicate`, skipping over lag.
pub async fn next_event<F>(events: &mut EventStream, mut predicate: F) -> CoreEvent
where
    F: FnMut(&CoreEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    };
    tokio::time::timeout(TIMEOUT, wait)
        .await
        .expect("event arrived before timeout")
}

/// Everything already queued on `events`.
pub fn drain_events(events: &mut EventStream) -> Vec<CoreEvent> {
    let mut drained = Vec::new();
    while let Some(result) = events.try_recv() {
        match result {
            Ok(event) => drained.push(event),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    drained
}
