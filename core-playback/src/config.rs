//! # Engine Configuration
//!
//! Configuration, task state and statistics types for engine instances.

use crate::clock::ClockTime;
use crate::format::AudioInfo;
use serde::{Deserialize, Serialize};

/// Engine configuration.
///
/// Controls looping, the initial subsong, output defaults and channel sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Loop count handed to the decoder at load time.
    ///
    /// `-1` loops forever, `0` plays through once, `n > 0` repeats the loop
    /// section `n` times before continuing past it.
    ///
    /// Default: 0.
    #[serde(default = "default_num_loops")]
    pub num_loops: i32,

    /// Subsong selected at load time.
    ///
    /// Default: 0.
    #[serde(default = "default_initial_subsong")]
    pub initial_subsong: u32,

    /// Output sample rate offered to the decoder when downstream has no
    /// preference.
    ///
    /// Default: 48000 Hz.
    #[serde(default = "default_sample_rate")]
    pub default_sample_rate: u32,

    /// Output channel count offered to the decoder when downstream has no
    /// preference.
    ///
    /// Default: 2.
    #[serde(default = "default_channels")]
    pub default_channels: u16,

    /// Sample frames the decoder should render per buffer.
    ///
    /// Smaller buffers lower control latency (commands are handled between
    /// buffers) at the cost of more iterations.
    ///
    /// Default: 1024 frames (~21ms at 48kHz).
    #[serde(default = "default_samples_per_buffer")]
    pub samples_per_buffer: usize,

    /// Capacity of the control command channel.
    ///
    /// Default: 32.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    /// Capacity of the event bus created when none is supplied.
    ///
    /// Default: 100.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_loops: default_num_loops(),
            initial_subsong: default_initial_subsong(),
            default_sample_rate: default_sample_rate(),
            default_channels: default_channels(),
            samples_per_buffer: default_samples_per_buffer(),
            command_capacity: default_command_capacity(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration optimized for low control latency.
    ///
    /// - Small buffers (256 frames)
    /// - Larger command channel
    pub fn low_latency() -> Self {
        Self {
            samples_per_buffer: 256,
            command_capacity: 64,
            ..Default::default()
        }
    }

    /// Create a configuration that loops forever, for background music.
    pub fn endless() -> Self {
        Self {
            num_loops: -1,
            samples_per_buffer: 4096,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_sample_rate == 0 {
            return Err("default_sample_rate must be > 0".to_string());
        }

        if self.default_channels == 0 {
            return Err("default_channels must be > 0".to_string());
        }

        if self.samples_per_buffer == 0 {
            return Err("samples_per_buffer must be > 0".to_string());
        }

        if self.command_capacity == 0 {
            return Err("command_capacity must be > 0".to_string());
        }

        if self.event_buffer_size == 0 {
            return Err("event_buffer_size must be > 0".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_num_loops() -> i32 {
    0
}

fn default_initial_subsong() -> u32 {
    0
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    2
}

fn default_samples_per_buffer() -> usize {
    1024 // ~21ms at 48kHz
}

fn default_command_capacity() -> usize {
    32
}

fn default_event_buffer_size() -> usize {
    100
}

// ============================================================================
// Task State
// ============================================================================

/// State of the driving task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting for data (push mode before the source is complete).
    NotStarted,
    /// Decoding and pushing.
    Running,
    /// Idle until a seek, subsong switch or resume.
    Paused,
    /// Torn down.
    Stopped,
}

impl TaskState {
    /// Returns `true` while the task can still do work.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Running | Self::Paused)
    }

    /// Returns `true` if the task is gone.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Counters maintained by the driving task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackStats {
    /// Size of the loaded source in bytes.
    pub bytes_loaded: u64,
    /// Buffers accepted downstream.
    pub buffers_pushed: u64,
    /// Sample frames accepted downstream.
    pub samples_pushed: u64,
    /// Loop jumps taken.
    pub loops: u64,
    /// Seeks completed.
    pub seeks: u64,
    /// Seeks refused.
    pub failed_seeks: u64,
    /// Allocation negotiations completed.
    pub negotiations: u64,
    /// Buffers refused downstream.
    pub flow_errors: u64,
}

impl PlaybackStats {
    /// Fraction of pushes that downstream refused (0.0 to 1.0).
    pub fn flow_error_rate(&self) -> f64 {
        let attempts = self.buffers_pushed + self.flow_errors;
        if attempts == 0 {
            return 0.0;
        }
        self.flow_errors as f64 / attempts as f64
    }
}

/// Read-only snapshot published by the driving task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub loaded: bool,
    /// Set once a load attempt failed; the instance will not load again.
    pub load_failed: bool,
    pub duration: Option<ClockTime>,
    pub num_subsongs: u32,
    pub current_subsong: u32,
    pub num_loops: i32,
    pub task_state: TaskState,
    pub audio_info: Option<AudioInfo>,
    pub can_seek: bool,
    pub can_tell: bool,
    pub segment_start: ClockTime,
    pub segment_stop: Option<ClockTime>,
    pub stats: PlaybackStats,
}

impl EngineStatus {
    pub fn new(config: &EngineConfig, can_seek: bool, can_tell: bool) -> Self {
        Self {
            loaded: false,
            load_failed: false,
            duration: None,
            num_subsongs: 0,
            current_subsong: config.initial_subsong,
            num_loops: config.num_loops,
            task_state: TaskState::NotStarted,
            audio_info: None,
            can_seek,
            can_tell,
            segment_start: 0,
            segment_stop: None,
            stats: PlaybackStats::default(),
        }
    }

    /// Loaded with a usable output format.
    pub fn is_ready(&self) -> bool {
        self.loaded && self.audio_info.map(|info| info.is_valid()).unwrap_or(false)
    }
}
