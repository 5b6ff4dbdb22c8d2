//! # Playback Clock
//!
//! Time and sample bookkeeping for one engine instance: the current
//! [`Segment`], the negotiated [`AudioInfo`] and the monotonic sample offset
//! of everything pushed downstream.
//!
//! Conversions round half up in both directions so that converting a time to
//! samples and back lands within one sample period of where it started.

use crate::format::AudioInfo;
use crate::segment::Segment;

/// Nanoseconds.
pub type ClockTime = u64;

/// One second in [`ClockTime`] units.
pub const SECOND: ClockTime = 1_000_000_000;

/// `round(time * rate / SECOND)`
pub fn samples_for_time(time: ClockTime, rate: u32) -> u64 {
    scale_round(time, u64::from(rate), SECOND)
}

/// `round(samples * SECOND / rate)`, zero when the rate is unknown.
pub fn time_for_samples(samples: u64, rate: u32) -> ClockTime {
    if rate == 0 {
        return 0;
    }
    scale_round(samples, SECOND, u64::from(rate))
}

fn scale_round(value: u64, num: u64, denom: u64) -> u64 {
    let denom = u128::from(denom);
    let scaled = (u128::from(value) * u128::from(num) + denom / 2) / denom;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Timestamps attached to one output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferTiming {
    pub pts: ClockTime,
    pub duration: ClockTime,
    /// Sample offset of the first frame
    pub offset: u64,
    /// Sample offset one past the last frame
    pub offset_end: u64,
}

/// Segment, output format and sample offset of a running engine.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    info: Option<AudioInfo>,
    segment: Segment,
    offset: u64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            info: None,
            segment: Segment::new(None),
            offset: 0,
        }
    }

    pub fn info(&self) -> Option<&AudioInfo> {
        self.info.as_ref()
    }

    pub fn rate(&self) -> u32 {
        self.info.map(|info| info.rate).unwrap_or(0)
    }

    /// Replace the output format. Returns `true` when it actually changed.
    ///
    /// A rate change rescales the sample offset so the stream position is
    /// kept and later buffers are stamped at the new rate.
    pub fn set_info(&mut self, info: AudioInfo) -> bool {
        let changed = self.info != Some(info);
        let previous_rate = self.rate();
        if previous_rate != 0 && previous_rate != info.rate {
            let position = time_for_samples(self.offset, previous_rate);
            self.offset = samples_for_time(position, info.rate);
        }
        self.info = Some(info);
        changed
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Stream time of the next sample to be pushed.
    pub fn position(&self) -> ClockTime {
        time_for_samples(self.offset, self.rate())
    }

    /// Start over with a full-range segment, e.g. after load or a subsong switch.
    pub fn reset(&mut self, duration: Option<ClockTime>) {
        self.segment = Segment::new(duration);
        self.offset = 0;
    }

    /// Adopt a segment produced by a successful seek.
    pub fn commit_segment(&mut self, segment: Segment) {
        self.offset = samples_for_time(segment.position, self.rate());
        self.segment = segment;
    }

    /// Timestamp the next `count` samples and advance the offset past them.
    pub fn stamp(&mut self, count: u64) -> BufferTiming {
        let rate = self.rate();
        let offset = self.offset;
        let offset_end = offset.saturating_add(count);
        let pts = time_for_samples(offset, rate);
        let end = time_for_samples(offset_end, rate);

        self.offset = offset_end;

        BufferTiming {
            pts,
            duration: end - pts,
            offset,
            offset_end,
        }
    }

    /// Continue from `position` after the decoder jumped back to a loop start.
    ///
    /// Returns the new segment, whose base is the running time reached so far.
    pub fn apply_loop(&mut self, position: ClockTime) -> Segment {
        let reached = self.segment.clamp_position(self.position());
        let running_time = self
            .segment
            .to_running_time(reached)
            .unwrap_or(self.segment.base);

        self.segment = self.segment.rebased(running_time, position);
        self.offset = samples_for_time(position, self.rate());
        self.segment.clone()
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}
