//! End-to-end tests driving the tone decoder through the engine.

mod common;

use bridge_desktop::MemorySource;
use common::*;
use core_playback::clock::time_for_samples;
use core_playback::decoder::{ToneDecoder, ToneSheet, ToneSubsong};
use core_playback::{
    AudioInfo, DownstreamEvent, EngineConfig, FlowError, NonstreamEngine, PlaybackError,
    SampleFormat, SeekFlags, SeekFormat, SeekRequest, SeekType, Segment, TaskState, SECOND,
};
use core_runtime::events::{AlertEvent, CoreEvent, PlaybackEvent};
use std::sync::Arc;

fn frames(count: u64) -> u64 {
    time_for_samples(count, 48_000)
}

fn is_end_of_media(event: &CoreEvent) -> bool {
    matches!(event, CoreEvent::Playback(PlaybackEvent::EndOfMedia { .. }))
}

fn is_warning(event: &CoreEvent) -> bool {
    matches!(event, CoreEvent::Alert(AlertEvent::Warning { .. }))
}

/// Records from the first `Segment` event after `skip` onwards, split into
/// that segment and the buffers that followed it.
fn segment_and_buffers_after(records: &[Record], skip: usize) -> (Segment, Vec<PushedBuffer>) {
    let (at, segment) = records
        .iter()
        .enumerate()
        .skip(skip)
        .find_map(|(i, r)| match r {
            Record::Event(DownstreamEvent::Segment(s)) => Some((i, s.clone())),
            _ => None,
        })
        .expect("segment event");
    let buffers = records[at..]
        .iter()
        .filter_map(|r| match r {
            Record::Buffer(b) => Some(b.clone()),
            _ => None,
        })
        .collect();
    (segment, buffers)
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_pull_load_plays_to_loop_end_without_loops() {
    let sink = RecordingSink::new();
    let (handle, mut events) = start(&looping_sheet(), sink.clone(), config(0));

    let loaded = next_event(&mut events, |e| {
        matches!(e, CoreEvent::Playback(PlaybackEvent::Loaded { .. }))
    })
    .await;
    match loaded {
        CoreEvent::Playback(PlaybackEvent::Loaded {
            duration_ns,
            num_subsongs,
            ..
        }) => {
            assert_eq!(duration_ns, Some(frames(4096)));
            assert_eq!(num_subsongs, 2);
        }
        other => panic!("unexpected event {other:?}"),
    }

    next_event(&mut events, is_end_of_media).await;
    let status = wait_paused(&handle).await;

    assert!(status.loaded);
    assert_eq!(status.num_subsongs, 2);
    assert_eq!(status.duration, Some(frames(4096)));
    assert_eq!(sink.total_frames(), 2048);
    assert_eq!(status.stats.samples_pushed, 2048);
    assert_eq!(status.stats.buffers_pushed, 4);
    assert_eq!(status.stats.loops, 0);

    let records = sink.events();
    assert!(matches!(records.first(), Some(DownstreamEvent::Segment(_))));
    assert!(records.iter().any(|e| matches!(
        e,
        DownstreamEvent::Tags(tags) if tags.title.as_deref() == Some("Unreal Theme")
    )));
    assert_eq!(records.last(), Some(&DownstreamEvent::Eos));
}

#[tokio::test]
async fn test_buffers_are_contiguous() {
    let sink = RecordingSink::new();
    let (handle, _events) = start(&looping_sheet(), sink.clone(), config(0));
    wait_paused(&handle).await;

    let buffers = sink.buffers();
    let mut expected_offset = 0;
    for buffer in &buffers {
        assert_eq!(buffer.offset, expected_offset);
        assert_eq!(buffer.pts, frames(buffer.offset));
        assert_eq!(buffer.pts + buffer.duration, frames(buffer.offset_end));
        assert_eq!(buffer.size, buffer.frames() as usize * 4);
        assert!(!buffer.discont);
        expected_offset = buffer.offset_end;
    }
}

#[tokio::test]
async fn test_tags_are_posted() {
    let sink = RecordingSink::new();
    let (_handle, mut events) = start(&looping_sheet(), sink, config(0));

    let tags = next_event(&mut events, |e| {
        matches!(e, CoreEvent::Playback(PlaybackEvent::Tags { .. }))
    })
    .await;
    match tags {
        CoreEvent::Playback(PlaybackEvent::Tags { title, comment, .. }) => {
            assert_eq!(title.as_deref(), Some("Unreal Theme"));
            assert_eq!(comment.as_deref(), Some("two subsongs"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_downstream_preference_fills_unspecified_format() {
    let sheet = ToneSheet::new(0, 0).subsong(ToneSubsong::new(4410, 440));
    let sink = RecordingSink::with_preferred(44_100, 1);
    let (handle, _events) = start(&sheet, sink.clone(), config(0));

    let status = wait_paused(&handle).await;
    let info = status.audio_info.expect("format decided at load");
    assert_eq!(info.rate, 44_100);
    assert_eq!(info.channels, 1);
    assert_eq!(status.duration, Some(SECOND / 10));
    assert_eq!(sink.caps().len(), 1);
    assert_eq!(sink.caps()[0].rate, 44_100);
}

#[tokio::test]
async fn test_unknown_size_fails_load_fatally() {
    let source = MemorySource::new(looping_sheet().to_bytes()).without_length();
    let sink = RecordingSink::new();
    let (handle, mut events) = start_with_source(Arc::new(source), sink.clone(), config(0));

    let error = next_event(&mut events, |e| {
        matches!(e, CoreEvent::Alert(AlertEvent::Error { .. }))
    })
    .await;
    assert!(matches!(
        error,
        CoreEvent::Alert(AlertEvent::Error { fatal: true, ref message, .. })
            if message.contains("size")
    ));

    let status = wait_until(&handle, |s| s.load_failed).await;
    assert!(!status.loaded);
    assert_eq!(status.task_state, TaskState::Paused);
    assert!(sink.buffers().is_empty());
}

#[tokio::test]
async fn test_unparseable_data_fails_load_fatally() {
    let source = MemorySource::new(&b"IMPM not a tone sheet"[..]);
    let (handle, mut events) = start_with_source(Arc::new(source), RecordingSink::new(), config(0));

    let error = next_event(&mut events, |e| {
        matches!(e, CoreEvent::Alert(AlertEvent::Error { .. }))
    })
    .await;
    assert!(matches!(
        error,
        CoreEvent::Alert(AlertEvent::Error { fatal: true, .. })
    ));
    assert!(wait_until(&handle, |s| s.load_failed).await.load_failed);

    // Nothing to seek in
    let result = handle.seek(SeekRequest::to_position(0)).await;
    assert!(matches!(result, Err(PlaybackError::NotLoaded)));
}

// ============================================================================
// Push mode
// ============================================================================

#[tokio::test]
async fn test_push_mode_loads_once_length_is_reached() {
    let source = MemorySource::push_only(looping_sheet().to_bytes(), true);
    let chunks = source.chunks(7);
    let sink = RecordingSink::new();
    let (handle, _events) = start_with_source(Arc::new(source.clone()), sink.clone(), config(0));

    assert_eq!(handle.status().task_state, TaskState::NotStarted);
    for chunk in chunks {
        handle.push_chunk(chunk).await.unwrap();
    }

    let status = wait_paused(&handle).await;
    assert!(status.loaded);
    assert_eq!(status.stats.bytes_loaded, source.data().len() as u64);
    assert_eq!(sink.total_frames(), 2048);
}

#[tokio::test]
async fn test_push_mode_without_length_waits_for_end_of_input() {
    let source = MemorySource::push_only(looping_sheet().to_bytes(), false);
    let sink = RecordingSink::new();
    let (handle, _events) = start_with_source(Arc::new(source.clone()), sink.clone(), config(0));

    for chunk in source.chunks(16) {
        handle.push_chunk(chunk).await.unwrap();
    }
    // Round trip through the task so every chunk has been handled
    handle.num_loops().await.unwrap();
    assert!(!handle.status().loaded);

    handle.end_of_input().await.unwrap();
    let status = wait_paused(&handle).await;
    assert!(status.loaded);
    assert_eq!(sink.total_frames(), 2048);
}

#[tokio::test]
async fn test_push_mode_end_of_input_without_data_fails() {
    let source = MemorySource::push_only(bytes::Bytes::new(), false);
    let (handle, mut events) = start_with_source(Arc::new(source), RecordingSink::new(), config(0));

    handle.end_of_input().await.unwrap();
    next_event(&mut events, |e| {
        matches!(e, CoreEvent::Alert(AlertEvent::Error { fatal: true, .. }))
    })
    .await;
    assert!(wait_until(&handle, |s| s.load_failed).await.load_failed);
}

// ============================================================================
// Looping
// ============================================================================

#[tokio::test]
async fn test_finite_loops_then_play_through() {
    let sink = RecordingSink::new();
    let (handle, mut events) = start(&looping_sheet(), sink.clone(), config(2));

    for expected in 1..=2u32 {
        let boundary = next_event(&mut events, |e| {
            matches!(e, CoreEvent::Playback(PlaybackEvent::LoopBoundary { .. }))
        })
        .await;
        assert!(matches!(
            boundary,
            CoreEvent::Playback(PlaybackEvent::LoopBoundary { count, position_ns, .. })
                if count == expected && position_ns == frames(1024)
        ));
    }

    next_event(&mut events, is_end_of_media).await;
    let status = wait_paused(&handle).await;

    // 0..2048, 1024..2048 twice, then 2048..4096
    assert_eq!(sink.total_frames(), 6144);
    assert_eq!(status.stats.loops, 2);

    let events = sink.events();
    let jumps = events
        .iter()
        .filter(|e| matches!(e, DownstreamEvent::Discontinuity { .. }))
        .count();
    assert_eq!(jumps, 2);
}

#[tokio::test]
async fn test_loop_restamps_buffers_and_rebases_segment() {
    let sink = RecordingSink::new();
    let (handle, _events) = start(&looping_sheet(), sink.clone(), config(1));
    wait_paused(&handle).await;

    let buffers = sink.buffers();
    let jumped = buffers
        .iter()
        .position(|b| b.discont)
        .expect("a buffer flagged after the loop");
    assert_eq!(jumped, 4);
    assert_eq!(buffers[jumped].offset, 1024);
    assert_eq!(buffers[jumped].pts, frames(1024));
    assert_eq!(buffers.iter().filter(|b| b.discont).count(), 1);

    // The loop segment continues running time from where the jump happened
    let segments: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            DownstreamEvent::Segment(segment) => Some(segment),
            _ => None,
        })
        .collect();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[1].start, frames(1024));
    assert_eq!(segments[1].base, frames(2048));
}

#[tokio::test]
async fn test_endless_looping_until_downstream_stops() {
    let sink = RecordingSink::with_limit(20);
    let (handle, mut events) = start(&looping_sheet(), sink.clone(), config(-1));

    let status = wait_paused(&handle).await;
    assert_eq!(sink.buffers().len(), 20);
    assert!(status.stats.loops >= 7);
    assert_eq!(status.stats.flow_errors, 1);

    // Downstream EOS pauses quietly
    let seen = drain_events(&mut events);
    assert!(!seen.iter().any(is_end_of_media));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, CoreEvent::Alert(AlertEvent::Error { .. }))));
    assert!(!sink.events().contains(&DownstreamEvent::Eos));
}

#[tokio::test]
async fn test_lowering_loop_count_ends_at_next_boundary() {
    let sink = RecordingSink::with_limit(10);
    let (handle, mut events) = start(&looping_sheet(), sink.clone(), config(-1));
    wait_paused(&handle).await;

    handle.set_num_loops(0).await.unwrap();
    assert_eq!(handle.num_loops().await.unwrap(), 0);

    sink.raise_limit(None);
    handle.resume().await.unwrap();

    next_event(&mut events, is_end_of_media).await;
    let status = wait_paused(&handle).await;
    assert_eq!(status.num_loops, 0);
    assert_eq!(sink.events().last(), Some(&DownstreamEvent::Eos));
}

// ============================================================================
// Seeking
// ============================================================================

#[tokio::test]
async fn test_flushing_seek_restarts_from_target() {
    let sink = RecordingSink::new();
    let (handle, _events) = start(&looping_sheet(), sink.clone(), config(0));
    wait_paused(&handle).await;
    sink.clear();

    handle
        .seek(SeekRequest::to_position(frames(1024)))
        .await
        .unwrap();
    let status = wait_paused(&handle).await;
    assert_eq!(status.stats.seeks, 1);
    assert_eq!(status.segment_start, frames(1024));

    let records = sink.events();
    assert_eq!(records[0], DownstreamEvent::FlushStart);
    assert_eq!(records[1], DownstreamEvent::FlushStop);
    assert!(matches!(&records[2], DownstreamEvent::Segment(s) if s.start == frames(1024)));

    let buffers = sink.buffers();
    assert_eq!(buffers[0].offset, 1024);
    assert_eq!(buffers[0].pts, frames(1024));
    assert!(buffers[0].discont);
    // Loop counter restarted, so n=0 ends at the loop end again
    assert_eq!(sink.total_frames(), 1024);
}

#[tokio::test]
async fn test_flushing_seek_during_playback() {
    let sink = RecordingSink::new();
    let (handle, _events) = start(&looping_sheet(), sink.clone(), config(-1));
    wait_until(&handle, |s| s.stats.buffers_pushed >= 6).await;
    assert_eq!(handle.status().task_state, TaskState::Running);

    let records_before = sink.records().len();
    handle
        .seek(SeekRequest::to_position(frames(3000)))
        .await
        .unwrap();
    assert_eq!(handle.status().task_state, TaskState::Running);

    // Past the loop end, so playback runs out at the end of the subsong
    let status = wait_paused(&handle).await;
    assert_eq!(status.stats.seeks, 1);

    let records = sink.records();
    assert_eq!(
        records[records_before],
        Record::Event(DownstreamEvent::FlushStart)
    );
    assert_eq!(
        records[records_before + 1],
        Record::Event(DownstreamEvent::FlushStop)
    );

    let (segment, buffers) = segment_and_buffers_after(&records, records_before);
    assert_eq!(segment.start, frames(3000));
    assert_eq!(segment.base, 0);
    assert_eq!(buffers[0].offset, 3000);
    assert_eq!(buffers[0].pts, frames(3000));
    assert!(buffers[0].discont);
    assert!(buffers[1..].iter().all(|b| !b.discont));
    assert_eq!(buffers.iter().map(PushedBuffer::frames).sum::<u64>(), 4096 - 3000);
    assert_eq!(sink.events().last(), Some(&DownstreamEvent::Eos));
}

#[tokio::test]
async fn test_non_flushing_seek_during_playback_keeps_running_time() {
    let sink = RecordingSink::new();
    let (handle, _events) = start(&looping_sheet(), sink.clone(), config(-1));
    wait_until(&handle, |s| s.stats.buffers_pushed >= 6).await;

    let records_before = sink.records().len();
    let request = SeekRequest::to_position(frames(3000)).with_flags(SeekFlags::default());
    handle.seek(request).await.unwrap();
    wait_paused(&handle).await;

    let records = sink.records();
    assert!(!records
        .iter()
        .any(|r| matches!(r, Record::Event(DownstreamEvent::FlushStart))));

    // Running time carries on from everything played before the seek
    let played: u64 = records[..records_before]
        .iter()
        .filter_map(|r| match r {
            Record::Buffer(b) => Some(b.frames()),
            _ => None,
        })
        .sum();
    let (segment, buffers) = segment_and_buffers_after(&records, records_before);
    assert_eq!(segment.start, frames(3000));
    assert!(segment.base.abs_diff(frames(played)) <= SECOND / 48_000);

    assert_eq!(buffers[0].offset, 3000);
    assert_eq!(buffers[0].pts, frames(3000));
    assert!(buffers[0].discont);
    assert_eq!(segment.to_running_time(buffers[0].pts), Some(segment.base));
}

#[tokio::test]
async fn test_failed_seek_during_playback_pauses_until_resumed() {
    let sink = RecordingSink::new();
    let (handle, mut events) = start(&long_loop_sheet(), sink.clone(), config(-1));
    wait_until(&handle, |s| s.stats.buffers_pushed >= 4).await;

    let inverted = SeekRequest::to_position(frames(20_000))
        .with_stop(SeekType::Set, Some(frames(10_000) as i64));
    assert!(handle.seek(inverted).await.is_err());
    next_event(&mut events, is_warning).await;

    let status = handle.status();
    assert_eq!(status.task_state, TaskState::Paused);
    assert_eq!(status.segment_start, 0);
    let position = handle.query_position().await.unwrap();
    assert_eq!(handle.query_position().await.unwrap(), position);

    let pushed = status.stats.buffers_pushed;
    let records_before = sink.records().len();
    handle.resume().await.unwrap();
    wait_until(&handle, |s| s.stats.buffers_pushed >= pushed + 2).await;
    handle.shutdown().await.unwrap();

    let resumed: Vec<PushedBuffer> = sink.records()[records_before..]
        .iter()
        .filter_map(|r| match r {
            Record::Buffer(b) => Some(b.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(resumed[0].pts, position);
}

#[tokio::test]
async fn test_seek_lands_within_one_sample() {
    let sink = RecordingSink::new();
    let (handle, _events) = start(&looping_sheet(), sink.clone(), config(0));
    wait_paused(&handle).await;
    sink.clear();

    let target = SECOND / 100;
    handle.seek(SeekRequest::to_position(target)).await.unwrap();
    wait_paused(&handle).await;

    let first = &sink.buffers()[0];
    assert!(first.pts.abs_diff(target) <= SECOND / 48_000 + 1);
    assert!(first.discont);
}

#[tokio::test]
async fn test_position_is_stable_at_end_of_media() {
    let sink = RecordingSink::new();
    let (handle, _events) = start(&looping_sheet(), sink, config(0));
    wait_paused(&handle).await;

    let first = handle.query_position().await.unwrap();
    let second = handle.query_position().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, frames(2048));
}

#[tokio::test]
async fn test_seek_in_unsupported_format_warns_without_flushing() {
    let sink = RecordingSink::new();
    let (handle, mut events) = start(&looping_sheet(), sink.clone(), config(0));
    wait_paused(&handle).await;
    sink.clear();

    let request = SeekRequest::to_position(0).with_format(SeekFormat::Bytes);
    let result = handle.seek(request).await;
    assert!(matches!(result, Err(PlaybackError::UnsupportedSeekFormat(_))));

    next_event(&mut events, is_warning).await;
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_failed_seek_keeps_position_and_warns() {
    let sink = RecordingSink::new();
    let (handle, mut events) = start(&looping_sheet(), sink.clone(), config(0));
    wait_paused(&handle).await;
    let before = handle.query_position().await.unwrap();
    sink.clear();

    let inverted = SeekRequest::to_position(frames(2000))
        .with_stop(SeekType::Set, Some(frames(1000) as i64));
    let result = handle.seek(inverted).await;
    assert!(result.unwrap_err().is_seek_failure());

    let warning = next_event(&mut events, is_warning).await;
    assert!(matches!(
        warning,
        CoreEvent::Alert(AlertEvent::Warning { ref message, .. }) if message.contains("seek")
    ));

    let status = handle.status();
    assert_eq!(status.task_state, TaskState::Paused);
    assert_eq!(status.stats.failed_seeks, 1);
    assert_eq!(status.stats.seeks, 0);
    assert_eq!(handle.query_position().await.unwrap(), before);

    // Downstream is never left flushing
    assert_eq!(
        sink.events(),
        vec![DownstreamEvent::FlushStart, DownstreamEvent::FlushStop]
    );
}

#[tokio::test]
async fn test_non_positive_rate_is_rejected() {
    let sink = RecordingSink::new();
    let (handle, _events) = start(&looping_sheet(), sink, config(0));
    wait_paused(&handle).await;

    let result = handle
        .seek(SeekRequest::to_position(0).with_rate(0.0))
        .await;
    assert!(matches!(result, Err(PlaybackError::InvalidSeek(_))));
}

#[tokio::test]
async fn test_query_seeking_and_duration() {
    let source = MemorySource::push_only(looping_sheet().to_bytes(), true);
    let (handle, _events) = start_with_source(Arc::new(source.clone()), RecordingSink::new(), config(0));

    assert_eq!(handle.query_seeking(), None);
    assert_eq!(handle.query_duration(), None);
    assert!(matches!(
        handle.query_position().await,
        Err(PlaybackError::NotLoaded)
    ));

    handle.push_chunk(source.data().clone()).await.unwrap();
    wait_paused(&handle).await;

    let seeking = handle.query_seeking().expect("seekable once loaded");
    assert_eq!(seeking.start, 0);
    assert_eq!(seeking.stop, Some(frames(4096)));
    assert_eq!(handle.query_duration(), Some(frames(4096)));
}

// ============================================================================
// Subsongs
// ============================================================================

#[tokio::test]
async fn test_subsong_switch_restarts_playback() {
    let sink = RecordingSink::new();
    let (handle, mut events) = start(&looping_sheet(), sink.clone(), config(0));
    wait_paused(&handle).await;
    sink.clear();

    handle.set_current_subsong(1).await.unwrap();
    let changed = next_event(&mut events, |e| {
        matches!(e, CoreEvent::Playback(PlaybackEvent::SubsongChanged { .. }))
    })
    .await;
    assert!(matches!(
        changed,
        CoreEvent::Playback(PlaybackEvent::SubsongChanged { index: 1, duration_ns: Some(d), .. })
            if d == SECOND
    ));

    let status = wait_paused(&handle).await;
    assert_eq!(status.current_subsong, 1);
    assert_eq!(status.duration, Some(SECOND));
    assert_eq!(handle.current_subsong().await.unwrap(), 1);
    assert_eq!(handle.query_duration(), Some(SECOND));

    let records = sink.events();
    assert_eq!(records[0], DownstreamEvent::FlushStart);
    assert_eq!(records[1], DownstreamEvent::FlushStop);
    assert!(matches!(&records[2], DownstreamEvent::Segment(s) if s.duration == Some(SECOND)));

    assert_eq!(sink.total_frames(), 48_000);
    assert_eq!(sink.buffers()[0].offset, 0);
}

#[tokio::test]
async fn test_out_of_range_subsong_is_ignored() {
    let sink = RecordingSink::new();
    let (handle, _events) = start(&looping_sheet(), sink, config(0));
    wait_paused(&handle).await;

    let result = handle.set_current_subsong(5).await;
    assert!(matches!(
        result,
        Err(PlaybackError::InvalidSubsong { index: 5, count: 2 })
    ));
    assert_eq!(handle.current_subsong().await.unwrap(), 0);
    assert_eq!(handle.num_subsongs(), 2);
}

#[tokio::test]
async fn test_subsong_chosen_before_load_is_used() {
    let source = MemorySource::push_only(looping_sheet().to_bytes(), true);
    let sink = RecordingSink::new();
    let (handle, _events) = start_with_source(Arc::new(source.clone()), sink.clone(), config(0));

    handle.set_current_subsong(1).await.unwrap();
    handle.push_chunk(source.data().clone()).await.unwrap();

    let status = wait_paused(&handle).await;
    assert_eq!(status.current_subsong, 1);
    assert_eq!(status.duration, Some(SECOND));
    assert_eq!(sink.total_frames(), 48_000);
}

// ============================================================================
// Downstream flow and negotiation
// ============================================================================

#[tokio::test]
async fn test_genuine_flow_failure_is_reported() {
    let sink = RecordingSink::new();
    sink.refuse_with(Some(FlowError::NotLinked));
    let (handle, mut events) = start(&looping_sheet(), sink.clone(), config(0));

    let error = next_event(&mut events, |e| {
        matches!(e, CoreEvent::Alert(AlertEvent::Error { .. }))
    })
    .await;
    assert!(matches!(
        error,
        CoreEvent::Alert(AlertEvent::Error { fatal: false, ref message, .. })
            if message.contains("not linked")
    ));

    let status = wait_paused(&handle).await;
    assert!(status.loaded);
    assert_eq!(status.stats.flow_errors, 1);
    assert!(sink.buffers().is_empty());

    // Recovers once downstream is linked
    sink.refuse_with(None);
    handle.resume().await.unwrap();
    wait_until(&handle, |s| s.stats.buffers_pushed > 0 && s.task_state == TaskState::Paused)
        .await;
    // The refused buffer is not rendered again
    assert_eq!(sink.total_frames(), 2048 - 512);
}

#[tokio::test]
async fn test_allocation_negotiated_once_for_unchanged_format() {
    let sink = RecordingSink::new();
    let (handle, _events) = start(&looping_sheet(), sink.clone(), config(2));
    let status = wait_paused(&handle).await;

    assert_eq!(sink.allocation_queries(), 1);
    assert_eq!(sink.caps().len(), 1);
    assert_eq!(status.stats.negotiations, 1);
    assert!(sink.buffers().iter().all(|b| b.allocator == "system"));
}

#[tokio::test]
async fn test_output_format_change_renegotiates() {
    let first = AudioInfo::new(SampleFormat::S16, 48_000, 2);
    let second = AudioInfo::new(SampleFormat::S16, 44_100, 2);
    let sink = RecordingSink::new();
    let (handle, _events) = start_with_decoder(
        Box::new(SwitchingDecoder::new(first, second, 3, 6)),
        Arc::new(MemorySource::new(vec![0u8; 16])),
        sink.clone(),
        config(0),
    );
    let status = wait_paused(&handle).await;

    let caps = sink.caps();
    assert_eq!(caps.len(), 2);
    assert_eq!(caps[0].rate, 48_000);
    assert_eq!(caps[1].rate, 44_100);
    assert_eq!(sink.allocation_queries(), 2);
    assert_eq!(status.stats.negotiations, 2);
    assert_eq!(status.audio_info, Some(second));

    let buffers = sink.buffers();
    assert_eq!(buffers.len(), 6);
    // 1440 frames at 48 kHz is 30 ms, which is 1323 frames at 44.1 kHz
    assert_eq!(buffers[3].offset, 1323);
    assert_eq!(buffers[3].pts, buffers[2].pts + buffers[2].duration);
    assert_eq!(buffers[3].pts, 30 * SECOND / 1000);
    assert_eq!(
        buffers[3].duration,
        time_for_samples(1803, 44_100) - time_for_samples(1323, 44_100)
    );
    assert!(buffers[3..].windows(2).all(|w| w[0].offset_end == w[1].offset));
}

#[tokio::test]
async fn test_decoder_narrows_loop_count() {
    let info = AudioInfo::new(SampleFormat::S16, 48_000, 2);
    let decoder = SwitchingDecoder::new(info, info, 0, 1).with_max_loops(2);
    let requested = decoder.requested_loops();
    let (handle, _events) = start_with_decoder(
        Box::new(decoder),
        Arc::new(MemorySource::new(vec![0u8; 16])),
        RecordingSink::new(),
        config(0),
    );
    wait_paused(&handle).await;

    handle.set_num_loops(5).await.unwrap();
    assert_eq!(handle.num_loops().await.unwrap(), 2);
    handle.set_num_loops(-1).await.unwrap();
    assert_eq!(handle.num_loops().await.unwrap(), -1);
    assert_eq!(*requested.lock(), vec![5, -1]);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_builder_validation() {
    let missing = NonstreamEngine::builder().sink(RecordingSink::new()).build();
    assert!(matches!(missing, Err(PlaybackError::InvalidConfig(_))));

    let invalid = NonstreamEngine::builder()
        .decoder(Box::new(ToneDecoder::new()))
        .sink(RecordingSink::new())
        .config(EngineConfig {
            samples_per_buffer: 0,
            ..EngineConfig::default()
        })
        .build();
    assert!(matches!(invalid, Err(PlaybackError::InvalidConfig(_))));

    let engine = NonstreamEngine::builder()
        .decoder(Box::new(ToneDecoder::new()))
        .sink(RecordingSink::new())
        .build()
        .unwrap();
    assert!(engine.capabilities().can_seek);
    assert!(engine.has_loop_control());
    assert!(engine.has_subsong_control());
}

#[tokio::test]
async fn test_shutdown_stops_task() {
    let sink = RecordingSink::with_limit(4);
    let (handle, _events) = start(&looping_sheet(), sink, config(-1));
    wait_paused(&handle).await;

    handle.shutdown().await.unwrap();
    assert_eq!(handle.status().task_state, TaskState::Stopped);
    assert!(matches!(
        handle.num_loops().await,
        Err(PlaybackError::EngineStopped)
    ));
}
