//! # Segments and Seek Requests
//!
//! A [`Segment`] describes the playback range that buffer timestamps are
//! interpreted against. Seeking never edits a segment in place:
//! [`Segment::do_seek`] returns a fresh one (or an error) and the caller
//! decides whether to commit it.
//!
//! The start/stop combination rules follow the usual media-framework seek
//! semantics:
//!
//! | Seek type | start                        | stop                        |
//! |-----------|------------------------------|-----------------------------|
//! | `None`    | keep previous start          | keep previous stop          |
//! | `Set`     | absolute value (negative → 0) | absolute value              |
//! | `End`     | `duration + value`           | `duration + value`          |
//!
//! Results are clamped to `[0, duration]` when the duration is known, and a
//! stop before the start fails the seek.

use crate::clock::ClockTime;
use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit a seek request is expressed in. Only [`SeekFormat::Time`] is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekFormat {
    /// Nanoseconds
    Time,
    Bytes,
    /// Sample frames
    Samples,
    Percent,
}

impl fmt::Display for SeekFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeekFormat::Time => "time",
            SeekFormat::Bytes => "bytes",
            SeekFormat::Samples => "samples",
            SeekFormat::Percent => "percent",
        };
        f.write_str(name)
    }
}

/// How a seek start or stop value is combined with the current segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekType {
    None,
    Set,
    End,
}

/// Seek flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekFlags {
    /// Discard queued data downstream and restart the running time at zero.
    pub flush: bool,
    /// Announce the new range as a sub-segment.
    pub segment: bool,
}

impl SeekFlags {
    pub fn flushing() -> Self {
        Self {
            flush: true,
            ..Default::default()
        }
    }

    pub fn with_segment(mut self) -> Self {
        self.segment = true;
        self
    }
}

/// A seek event as received from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeekRequest {
    pub rate: f64,
    pub format: SeekFormat,
    pub flags: SeekFlags,
    pub start_type: SeekType,
    pub start: i64,
    pub stop_type: SeekType,
    /// `None` with [`SeekType::Set`] means "play to the end".
    pub stop: Option<i64>,
}

impl SeekRequest {
    /// Flushing seek to an absolute time, stop unchanged.
    pub fn to_position(position: ClockTime) -> Self {
        Self {
            rate: 1.0,
            format: SeekFormat::Time,
            flags: SeekFlags::flushing(),
            start_type: SeekType::Set,
            start: i64::try_from(position).unwrap_or(i64::MAX),
            stop_type: SeekType::None,
            stop: None,
        }
    }

    pub fn new(
        rate: f64,
        format: SeekFormat,
        flags: SeekFlags,
        start_type: SeekType,
        start: i64,
        stop_type: SeekType,
        stop: Option<i64>,
    ) -> Self {
        Self {
            rate,
            format,
            flags,
            start_type,
            start,
            stop_type,
            stop,
        }
    }

    pub fn with_flags(mut self, flags: SeekFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_format(mut self, format: SeekFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_stop(mut self, stop_type: SeekType, stop: Option<i64>) -> Self {
        self.stop_type = stop_type;
        self.stop = stop;
        self
    }
}

/// Playback range used to interpret buffer timestamps. Times in nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub rate: f64,
    pub applied_rate: f64,
    pub format: SeekFormat,
    pub start: ClockTime,
    pub stop: Option<ClockTime>,
    pub position: ClockTime,
    /// Running time accumulated before this segment started
    pub base: ClockTime,
    /// Stream time corresponding to `start`
    pub time: ClockTime,
    pub duration: Option<ClockTime>,
}

impl Segment {
    /// Segment covering the whole media: `[0, duration]`.
    pub fn new(duration: Option<ClockTime>) -> Self {
        Self {
            rate: 1.0,
            applied_rate: 1.0,
            format: SeekFormat::Time,
            start: 0,
            stop: duration,
            position: 0,
            base: 0,
            time: 0,
            duration,
        }
    }

    /// Clamp `position` into `[start, stop]`.
    pub fn clamp_position(&self, position: ClockTime) -> ClockTime {
        let upper = self.stop.unwrap_or(ClockTime::MAX);
        position.clamp(self.start, upper.max(self.start))
    }

    /// Running time of a stream position, `None` outside the segment.
    pub fn to_running_time(&self, position: ClockTime) -> Option<ClockTime> {
        if position < self.start {
            return None;
        }
        if matches!(self.stop, Some(stop) if position > stop) {
            return None;
        }

        let elapsed = position - self.start;
        let scaled = if self.rate == 1.0 {
            elapsed
        } else {
            (elapsed as f64 / self.rate.abs()) as ClockTime
        };
        Some(self.base.saturating_add(scaled))
    }

    /// Compute the segment that results from applying `request`.
    ///
    /// `current_position` is where playback is now; it seeds the running-time
    /// base of non-flushing seeks and the position when the start is left
    /// unchanged. `self` is not modified.
    pub fn do_seek(&self, request: &SeekRequest, current_position: ClockTime) -> Result<Segment> {
        if request.format != SeekFormat::Time {
            return Err(PlaybackError::UnsupportedSeekFormat(
                request.format.to_string(),
            ));
        }
        if !request.rate.is_finite() || request.rate <= 0.0 {
            return Err(PlaybackError::InvalidSeek(format!(
                "unsupported playback rate {}",
                request.rate
            )));
        }

        let duration = self.duration.map(to_signed);

        let (start, update_start) = match request.start_type {
            SeekType::None => (to_signed(self.start), false),
            SeekType::Set => (request.start.max(0), true),
            SeekType::End => match duration {
                Some(d) => (d.saturating_add(request.start), true),
                None => (to_signed(self.start), false),
            },
        };
        let start = clamp_to_duration(start, duration);

        let stop = match request.stop_type {
            SeekType::None => self.stop.map(to_signed),
            SeekType::Set => request.stop,
            SeekType::End => match (duration, request.stop) {
                (Some(d), Some(offset)) => Some(d.saturating_add(offset)),
                (Some(d), None) => Some(d),
                (None, _) => self.stop.map(to_signed),
            },
        }
        .or(duration)
        .map(|stop| clamp_to_duration(stop, duration));

        if let Some(stop) = stop {
            if start > stop {
                return Err(PlaybackError::InvalidSeek(format!(
                    "start {} is after stop {}",
                    start, stop
                )));
            }
        }

        let start = start as ClockTime;
        let stop = stop.map(|s| s as ClockTime);

        let base = if request.flags.flush {
            0
        } else {
            let position = self.clamp_position(current_position);
            self.to_running_time(position).unwrap_or(0)
        };

        let position = if update_start {
            start
        } else {
            let upper = stop.unwrap_or(ClockTime::MAX).max(start);
            current_position.clamp(start, upper)
        };

        Ok(Segment {
            rate: request.rate,
            applied_rate: 1.0,
            format: SeekFormat::Time,
            start,
            stop,
            position,
            base,
            time: start,
            duration: self.duration,
        })
    }

    /// Segment that continues after a loop jump to `position`.
    ///
    /// The running time reached so far becomes the new base so output
    /// timestamps keep increasing.
    pub fn rebased(&self, running_time: ClockTime, position: ClockTime) -> Segment {
        let stop = match self.stop {
            Some(stop) if stop >= position => Some(stop),
            _ => self.duration,
        };

        Segment {
            rate: self.rate,
            applied_rate: self.applied_rate,
            format: SeekFormat::Time,
            start: position,
            stop,
            position,
            base: running_time,
            time: position,
            duration: self.duration,
        }
    }
}

fn to_signed(value: ClockTime) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn clamp_to_duration(value: i64, duration: Option<i64>) -> i64 {
    match duration {
        Some(d) => value.clamp(0, d),
        None => value.max(0),
    }
}
