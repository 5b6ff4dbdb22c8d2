//! # Output Format Types
//!
//! Raw PCM format descriptions shared by decoders, the clock and the
//! allocation negotiator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Media type of everything the engine outputs.
pub const RAW_AUDIO_MEDIA_TYPE: &str = "audio/x-raw";

/// Interleaved PCM sample format, native endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S32 | SampleFormat::F32 => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "U8",
            SampleFormat::S16 => "S16",
            SampleFormat::S32 => "S32",
            SampleFormat::F32 => "F32",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample format, rate and channel count of decoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u16,
}

impl AudioInfo {
    pub fn new(format: SampleFormat, rate: u32, channels: u16) -> Self {
        Self {
            format,
            rate,
            channels,
        }
    }

    /// A rate and a channel count of zero are both unusable.
    pub fn is_valid(&self) -> bool {
        self.rate > 0 && self.channels > 0
    }

    /// Size of one sample frame (all channels) in bytes.
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    /// Byte size of `frames` sample frames.
    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames * self.bytes_per_frame()
    }
}

impl fmt::Display for AudioInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}Hz {}ch", self.format, self.rate, self.channels)
    }
}

/// Capability descriptor sent downstream during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCaps {
    pub media_type: String,
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u16,
    pub interleaved: bool,
}

impl From<&AudioInfo> for AudioCaps {
    fn from(info: &AudioInfo) -> Self {
        Self {
            media_type: RAW_AUDIO_MEDIA_TYPE.to_string(),
            format: info.format,
            rate: info.rate,
            channels: info.channels,
            interleaved: true,
        }
    }
}

/// Formats a decoder is able to produce.
///
/// Output formats chosen at load time or changed later are checked against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    pub formats: Vec<SampleFormat>,
    pub rates: RangeInclusive<u32>,
    pub channels: RangeInclusive<u16>,
}

impl OutputTemplate {
    /// Accept any valid format.
    pub fn any() -> Self {
        Self {
            formats: vec![
                SampleFormat::U8,
                SampleFormat::S16,
                SampleFormat::S32,
                SampleFormat::F32,
            ],
            rates: 1..=u32::MAX,
            channels: 1..=u16::MAX,
        }
    }

    pub fn new(
        formats: Vec<SampleFormat>,
        rates: RangeInclusive<u32>,
        channels: RangeInclusive<u16>,
    ) -> Self {
        Self {
            formats,
            rates,
            channels,
        }
    }

    pub fn accepts(&self, info: &AudioInfo) -> bool {
        info.is_valid()
            && self.formats.contains(&info.format)
            && self.rates.contains(&info.rate)
            && self.channels.contains(&info.channels)
    }
}

impl Default for OutputTemplate {
    fn default() -> Self {
        Self::any()
    }
}

/// What downstream would like to receive, if it has an opinion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownstreamFormat {
    pub rate: Option<u32>,
    pub channels: Option<u16>,
}

impl DownstreamFormat {
    pub fn new(rate: Option<u32>, channels: Option<u16>) -> Self {
        Self { rate, channels }
    }

    /// Fill in missing values from defaults. Zero counts as "no opinion".
    pub fn resolve(&self, default_rate: u32, default_channels: u16) -> (u32, u16) {
        (
            self.rate.filter(|r| *r > 0).unwrap_or(default_rate),
            self.channels.filter(|c| *c > 0).unwrap_or(default_channels),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_info_sizes() {
        let info = AudioInfo::new(SampleFormat::S16, 48_000, 2);
        assert!(info.is_valid());
        assert_eq!(info.bytes_per_frame(), 4);
        assert_eq!(info.frames_to_bytes(1024), 4096);
        assert_eq!(info.to_string(), "S16 48000Hz 2ch");

        assert!(!AudioInfo::new(SampleFormat::F32, 0, 2).is_valid());
        assert!(!AudioInfo::new(SampleFormat::F32, 44_100, 0).is_valid());
    }

    #[test]
    fn test_caps_from_info() {
        let caps = AudioCaps::from(&AudioInfo::new(SampleFormat::F32, 44_100, 1));
        assert_eq!(caps.media_type, RAW_AUDIO_MEDIA_TYPE);
        assert_eq!(caps.rate, 44_100);
        assert_eq!(caps.channels, 1);
        assert!(caps.interleaved);
    }

    #[test]
    fn test_template_accepts() {
        let template = OutputTemplate::new(vec![SampleFormat::S16], 1..=48_000, 1..=2);
        assert!(template.accepts(&AudioInfo::new(SampleFormat::S16, 48_000, 2)));
        assert!(!template.accepts(&AudioInfo::new(SampleFormat::S16, 96_000, 2)));
        assert!(!template.accepts(&AudioInfo::new(SampleFormat::F32, 48_000, 2)));
        assert!(!template.accepts(&AudioInfo::new(SampleFormat::S16, 48_000, 6)));
        assert!(OutputTemplate::any().accepts(&AudioInfo::new(SampleFormat::U8, 8_000, 1)));
    }

    #[test]
    fn test_downstream_resolve() {
        assert_eq!(DownstreamFormat::default().resolve(48_000, 2), (48_000, 2));
        assert_eq!(
            DownstreamFormat::new(Some(44_100), None).resolve(48_000, 2),
            (44_100, 2)
        );
        assert_eq!(
            DownstreamFormat::new(Some(0), Some(1)).resolve(48_000, 2),
            (48_000, 1)
        );
    }
}
