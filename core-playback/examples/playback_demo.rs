//! # Non-Stream Playback Demo
//!
//! Renders a looping tone sheet through the engine into a sink that only
//! counts what it receives, then seeks, switches subsongs and changes the
//! loop count while printing engine notifications.
//!
//! Run with: `cargo run --example playback_demo --package core-playback`

use async_trait::async_trait;
use bridge_desktop::MemorySource;
use core_playback::decoder::{ToneDecoder, ToneSheet, ToneSubsong};
use core_playback::{
    AudioCaps, DownstreamEvent, EngineConfig, EngineHandle, FlowError, NonstreamEngine,
    OutputBuffer, OutputSink, SeekRequest, TaskState, SECOND,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Sink that accepts everything and keeps a tally.
#[derive(Default)]
struct CountingSink {
    buffers: AtomicU64,
    bytes: AtomicU64,
}

#[async_trait]
impl OutputSink for CountingSink {
    async fn push(&self, buffer: OutputBuffer) -> Result<(), FlowError> {
        self.buffers.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(buffer.size() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn send_event(&self, event: DownstreamEvent) -> bool {
        if let DownstreamEvent::Discontinuity { position } = event {
            info!(position_ms = position / 1_000_000, "Sink saw a loop jump");
        }
        true
    }

    fn set_caps(&self, caps: &AudioCaps) -> bool {
        info!(
            rate = caps.rate,
            channels = caps.channels,
            format = caps.format.as_str(),
            "Sink accepted caps"
        );
        true
    }
}

fn demo_sheet() -> ToneSheet {
    ToneSheet::new(44_100, 2)
        .with_title("Demo Sheet")
        .with_comment("an A4 with a loop, then an A3")
        // Two seconds, looping over the second half-second
        .subsong(ToneSubsong::new(88_200, 440).with_loop(22_050, 44_100))
        .subsong(ToneSubsong::new(44_100, 220))
}

async fn print_events(mut events: EventStream) {
    while let Ok(event) = events.recv().await {
        match event {
            CoreEvent::Playback(playback) => println!("  [playback] {:?}", playback),
            CoreEvent::Alert(alert) => println!("  [alert]    {:?}", alert),
        }
    }
}

async fn play_until_paused(handle: &EngineHandle, label: &str) -> anyhow::Result<()> {
    let status = handle
        .wait_for(|s| s.task_state == TaskState::Paused)
        .await?;
    println!(
        "{}: {} buffers, {} samples, {} loops",
        label, status.stats.buffers_pushed, status.stats.samples_pushed, status.stats.loops
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let core = CoreConfig::builder().build()?;
    core.init_logging()?;

    println!("=== Non-Stream Playback Demo ===\n");

    let sink = Arc::new(CountingSink::default());
    let engine = NonstreamEngine::builder()
        .decoder(Box::new(ToneDecoder::new()))
        .sink(sink.clone())
        .config(EngineConfig {
            num_loops: 2,
            ..EngineConfig::default()
        })
        .event_bus(core.event_bus())
        .build()?;

    tokio::spawn(print_events(EventStream::new(engine.events().subscribe())));

    let source = MemorySource::new(demo_sheet().to_bytes()).with_name("demo.tone");
    let handle = engine.activate(Arc::new(source))?;

    println!("1. Playing with two loops");
    play_until_paused(&handle, "   done").await?;
    if let Some(duration) = handle.query_duration() {
        println!("   duration: {} ms", duration / 1_000_000);
    }
    println!("   position: {} ms", handle.query_position().await? / 1_000_000);

    println!("\n2. Seeking to 1.5 s");
    handle.seek(SeekRequest::to_position(SECOND * 3 / 2)).await?;
    play_until_paused(&handle, "   done").await?;

    println!("\n3. Switching to subsong 1 of {}", handle.num_subsongs());
    handle.set_current_subsong(1).await?;
    play_until_paused(&handle, "   done").await?;

    println!("\n4. Back to subsong 0 without loops");
    handle.set_num_loops(0).await?;
    handle.set_current_subsong(0).await?;
    play_until_paused(&handle, "   done").await?;

    println!(
        "\nSink received {} buffers ({} bytes)",
        sink.buffers.load(Ordering::Relaxed),
        sink.bytes.load(Ordering::Relaxed)
    );

    handle.shutdown().await?;
    println!("\n=== Demo Complete ===");
    Ok(())
}
