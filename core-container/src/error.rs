//! # Container Error Types

use bridge_traits::BridgeError;
use core_playback::PlaybackError;
use thiserror::Error;

/// Errors raised while reading a legacy package.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The first four bytes are not the package signature.
    #[error("Not an Unreal package: expected signature 0x9E2A83C1, found {0:#010x}")]
    InvalidSignature(u32),

    /// A table or the payload runs past the end of the data.
    #[error("Package truncated: {0}")]
    Truncated(String),

    /// No export of class `Music` carries data.
    #[error("No music data found in package")]
    NoMusicData,

    /// A table index points outside its table.
    #[error("Index {index} out of range for the {table} table ({len} entries)")]
    IndexOutOfRange {
        table: &'static str,
        index: i64,
        len: usize,
    },

    /// A name table entry is not terminated inside the data.
    #[error("Invalid name table entry at offset {0}")]
    InvalidName(usize),

    #[error("Source error: {0}")]
    Source(#[from] BridgeError),

    /// Fetching the package from upstream failed.
    #[error("Loading package failed: {0}")]
    Load(#[from] PlaybackError),
}

impl ContainerError {
    /// `true` when the data is not a usable package, as opposed to an I/O
    /// failure.
    pub fn is_format_error(&self) -> bool {
        !matches!(self, ContainerError::Source(_) | ContainerError::Load(_))
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
