use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// Upstream cannot report its total length in bytes.
    #[error("Upstream size cannot be determined")]
    SizeUnknown,

    /// A pull request asked for bytes past the end of the source.
    #[error("Range {offset}+{length} is outside the source ({size} bytes)")]
    OutOfRange { offset: u64, length: u64, size: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
