//! # Playback Error Types
//!
//! Error types for loading, seeking, decoding and negotiating output.

use crate::traits::FlowError;
use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Load Errors
    // ========================================================================
    /// Upstream cannot report its length in bytes, so the whole source
    /// cannot be fetched.
    #[error("Cannot load: upstream size (in bytes) cannot be determined")]
    SizeUnknown,

    /// Reading from upstream failed.
    #[error("Cannot load: reading from upstream failed: {0}")]
    SourceError(String),

    /// The decoder refused the loaded data.
    #[error("Loading failed: {0}")]
    LoadRejected(String),

    /// A second load was attempted on the same engine instance.
    #[error("Media is already loaded")]
    AlreadyLoaded,

    /// The decoder produced an output format outside its template.
    #[error("Invalid output format: {0}")]
    InvalidOutputFormat(String),

    // ========================================================================
    // Seek Errors
    // ========================================================================
    /// Nothing is loaded yet.
    #[error("Nothing is loaded")]
    NotLoaded,

    /// Seek requests must be expressed in time.
    #[error("Seeking is only supported in time format, got {0}")]
    UnsupportedSeekFormat(String),

    /// The seek parameters do not describe a valid segment.
    #[error("Invalid seek: {0}")]
    InvalidSeek(String),

    /// The decoder could not move to the requested position.
    #[error("Decoder rejected seek: {0}")]
    SeekRejected(String),

    /// The decoder does not implement seeking.
    #[error("Seeking not supported")]
    SeekNotSupported,

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// Error occurred while rendering samples.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    // ========================================================================
    // Negotiation / Flow Errors
    // ========================================================================
    /// Output format or allocator negotiation with downstream failed.
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// Downstream refused a buffer.
    #[error("Downstream flow error: {0}")]
    Flow(FlowError),

    // ========================================================================
    // Control Errors
    // ========================================================================
    /// The decoder lacks an optional capability.
    #[error("Decoder capability missing: {0}")]
    CapabilityMissing(String),

    /// Subsong index out of range.
    #[error("Invalid subsong {index} (available: {count})")]
    InvalidSubsong { index: u32, count: u32 },

    /// The driving task has exited; the handle is no longer usable.
    #[error("Engine stopped")]
    EngineStopped,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Decoder registry error: {0}")]
    RegistryError(String),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` for errors raised while getting the source into the decoder.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            PlaybackError::SizeUnknown
                | PlaybackError::SourceError(_)
                | PlaybackError::LoadRejected(_)
                | PlaybackError::InvalidOutputFormat(_)
        )
    }

    /// Returns `true` for refused seeks. These never disturb playback state.
    pub fn is_seek_failure(&self) -> bool {
        matches!(
            self,
            PlaybackError::NotLoaded
                | PlaybackError::UnsupportedSeekFormat(_)
                | PlaybackError::InvalidSeek(_)
                | PlaybackError::SeekRejected(_)
                | PlaybackError::SeekNotSupported
        )
    }

    /// Returns `true` if no further processing is possible on this instance.
    pub fn is_fatal(&self) -> bool {
        self.is_load_failure() || matches!(self, PlaybackError::EngineStopped)
    }

    /// Returns `true` if the condition clears on its own (a flush ends,
    /// downstream finishes renegotiating).
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::NegotiationFailed(_) => true,
            PlaybackError::Flow(flow) => !flow.is_genuine_failure(),
            _ => false,
        }
    }
}

impl From<BridgeError> for PlaybackError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::SizeUnknown => PlaybackError::SizeUnknown,
            other => PlaybackError::SourceError(other.to_string()),
        }
    }
}

impl From<FlowError> for PlaybackError {
    fn from(err: FlowError) -> Self {
        PlaybackError::Flow(err)
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
