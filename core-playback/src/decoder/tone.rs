//! # Tone Sheet Decoder
//!
//! Renders each subsong as a sine tone in interleaved S16.

use crate::clock::{samples_for_time, time_for_samples, ClockTime};
use crate::error::{PlaybackError, Result};
use crate::format::{AudioInfo, OutputTemplate, SampleFormat};
use crate::loop_signal::LoopDecision;
use crate::traits::{
    DecodeContext, DecodedChunk, FormatInfo, LoadContext, LoopControl, NonstreamDecoder,
    SubsongControl, TagList,
};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

const MAGIC: &[u8; 4] = b"TONE";

/// Media type registered for tone sheets.
pub const TONE_MEDIA_TYPE: &str = "audio/x-tone-sheet";

/// One playable section of a tone sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneSubsong {
    pub frames: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub frequency: u32,
}

impl ToneSubsong {
    pub fn new(frames: u32, frequency: u32) -> Self {
        Self {
            frames,
            loop_start: 0,
            loop_end: 0,
            frequency,
        }
    }

    pub fn with_loop(mut self, start: u32, end: u32) -> Self {
        self.loop_start = start;
        self.loop_end = end;
        self
    }

    pub fn has_loop(&self) -> bool {
        self.loop_start < self.loop_end && self.loop_end <= self.frames
    }
}

/// Parsed tone sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneSheet {
    pub rate: u32,
    pub channels: u16,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub subsongs: Vec<ToneSubsong>,
}

impl ToneSheet {
    pub fn new(rate: u32, channels: u16) -> Self {
        Self {
            rate,
            channels,
            title: None,
            comment: None,
            subsongs: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn subsong(mut self, subsong: ToneSubsong) -> Self {
        self.subsongs.push(subsong);
        self
    }

    /// Serialize. Title and comment are cut at 255 bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_slice(MAGIC);
        out.put_u32_le(self.rate);
        out.put_u16_le(self.channels);
        put_text(&mut out, self.title.as_deref());
        put_text(&mut out, self.comment.as_deref());
        out.put_u16_le(self.subsongs.len() as u16);
        for subsong in &self.subsongs {
            out.put_u32_le(subsong.frames);
            out.put_u32_le(subsong.loop_start);
            out.put_u32_le(subsong.loop_end);
            out.put_u32_le(subsong.frequency);
        }
        out.freeze()
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader { data, pos: 0 };

        if reader.take(4)? != MAGIC {
            return Err(PlaybackError::LoadRejected("not a tone sheet".to_string()));
        }

        let rate = reader.u32()?;
        let channels = reader.u16()?;
        let title = reader.text()?;
        let comment = reader.text()?;
        let count = reader.u16()?;

        let mut subsongs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            subsongs.push(ToneSubsong {
                frames: reader.u32()?,
                loop_start: reader.u32()?,
                loop_end: reader.u32()?,
                frequency: reader.u32()?,
            });
        }

        Ok(Self {
            rate,
            channels,
            title,
            comment,
            subsongs,
        })
    }
}

fn put_text(out: &mut BytesMut, text: Option<&str>) {
    let bytes = text.map(str::as_bytes).unwrap_or_default();
    let len = bytes.len().min(u8::MAX as usize);
    out.put_u8(len as u8);
    out.put_slice(&bytes[..len]);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| PlaybackError::LoadRejected("truncated tone sheet".to_string()))?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn text(&mut self) -> Result<Option<String>> {
        let len = self.take(1)?[0] as usize;
        if len == 0 {
            return Ok(None);
        }
        let bytes = self.take(len)?;
        Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
    }
}

/// Decoder for [`ToneSheet`]s.
#[derive(Debug, Default)]
pub struct ToneDecoder {
    sheet: Option<ToneSheet>,
    info: Option<AudioInfo>,
    subsong: u32,
    frame: u64,
    ended: bool,
    num_loops: i32,
}

impl ToneDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Option<&ToneSubsong> {
        self.sheet
            .as_ref()
            .and_then(|sheet| sheet.subsongs.get(self.subsong as usize))
    }

    fn rate(&self) -> u32 {
        self.info.map(|info| info.rate).unwrap_or(0)
    }

    fn subsong_duration(&self) -> Option<ClockTime> {
        self.current()
            .map(|subsong| time_for_samples(u64::from(subsong.frames), self.rate()))
    }

    fn render(&self, out: &mut [u8], first_frame: u64, frequency: u32, info: &AudioInfo) {
        let step = 2.0 * std::f64::consts::PI * f64::from(frequency) / f64::from(info.rate);
        let frame_size = info.bytes_per_frame();

        for (i, frame) in out.chunks_exact_mut(frame_size).enumerate() {
            let phase = step * (first_frame + i as u64) as f64;
            let value = (phase.sin() * 0.25 * f64::from(i16::MAX)) as i16;
            for sample in frame.chunks_exact_mut(2) {
                sample.copy_from_slice(&value.to_ne_bytes());
            }
        }
    }
}

#[async_trait]
impl NonstreamDecoder for ToneDecoder {
    async fn load(&mut self, data: Bytes, ctx: &LoadContext) -> Result<FormatInfo> {
        if self.sheet.is_some() {
            return Err(PlaybackError::AlreadyLoaded);
        }

        let sheet = ToneSheet::parse(&data)?;
        if sheet.subsongs.is_empty() {
            return Err(PlaybackError::LoadRejected("tone sheet has no subsongs".to_string()));
        }

        let rate = if sheet.rate == 0 {
            ctx.preferred_rate
        } else {
            sheet.rate
        };
        let channels = if sheet.channels == 0 {
            ctx.preferred_channels
        } else {
            sheet.channels
        };
        let info = AudioInfo::new(SampleFormat::S16, rate, channels);

        let num_subsongs = sheet.subsongs.len() as u32;
        self.subsong = if ctx.initial_subsong < num_subsongs {
            ctx.initial_subsong
        } else {
            0
        };
        let metadata = TagList {
            title: sheet.title.clone(),
            comment: sheet.comment.clone(),
        };

        self.sheet = Some(sheet);
        self.info = Some(info);
        self.frame = 0;
        self.ended = false;
        self.num_loops = ctx.num_loops;

        debug!(%info, num_subsongs, subsong = self.subsong, "Loaded tone sheet");

        Ok(FormatInfo::new(info, self.subsong_duration())
            .with_subsongs(num_subsongs)
            .with_metadata(metadata))
    }

    async fn decode(&mut self, ctx: &mut DecodeContext<'_>) -> Result<Option<DecodedChunk>> {
        let subsong = *self.current().ok_or(PlaybackError::NotLoaded)?;
        let info = self.info.ok_or(PlaybackError::NotLoaded)?;

        let total = u64::from(subsong.frames);
        if self.ended || self.frame >= total {
            self.ended = true;
            return Ok(None);
        }

        let loop_end = u64::from(subsong.loop_end);
        let limit = if subsong.has_loop() && self.frame < loop_end {
            loop_end
        } else {
            total
        };
        let frames = (limit - self.frame).min(ctx.samples_per_buffer().max(1) as u64);

        let mut buffer = ctx.allocate(info.frames_to_bytes(frames as usize))?;
        self.render(buffer.data_mut(), self.frame, subsong.frequency, &info);
        self.frame += frames;

        if subsong.has_loop() && self.frame == loop_end {
            match ctx.loop_boundary() {
                LoopDecision::Loop => {
                    trace!(to = subsong.loop_start, "Looping");
                    self.frame = u64::from(subsong.loop_start);
                }
                LoopDecision::End => self.ended = true,
                LoopDecision::PassThrough => {}
            }
        }

        Ok(Some(DecodedChunk::new(buffer, frames)))
    }

    async fn seek(&mut self, position: ClockTime) -> Result<()> {
        let total = u64::from(self.current().ok_or(PlaybackError::NotLoaded)?.frames);
        self.frame = samples_for_time(position, self.rate()).min(total);
        self.ended = false;
        Ok(())
    }

    fn tell(&self) -> ClockTime {
        time_for_samples(self.frame, self.rate())
    }

    fn output_template(&self) -> OutputTemplate {
        OutputTemplate::new(vec![SampleFormat::S16], 1..=192_000, 1..=8)
    }

    fn loop_control(&mut self) -> Option<&mut dyn LoopControl> {
        Some(self)
    }

    fn subsong_control(&mut self) -> Option<&mut dyn SubsongControl> {
        Some(self)
    }
}

impl LoopControl for ToneDecoder {
    fn set_num_loops(&mut self, n: i32) -> Result<()> {
        self.num_loops = n;
        Ok(())
    }

    fn num_loops(&self) -> i32 {
        self.num_loops
    }
}

impl SubsongControl for ToneDecoder {
    fn current_subsong(&self) -> u32 {
        self.subsong
    }

    fn set_current_subsong(&mut self, index: u32) -> Result<Option<ClockTime>> {
        let count = self.num_subsongs();
        if index >= count {
            return Err(PlaybackError::InvalidSubsong { index, count });
        }

        self.subsong = index;
        self.frame = 0;
        self.ended = false;
        Ok(self.subsong_duration())
    }

    fn num_subsongs(&self) -> u32 {
        self.sheet
            .as_ref()
            .map(|sheet| sheet.subsongs.len() as u32)
            .unwrap_or(0)
    }
}
