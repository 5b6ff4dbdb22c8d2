//! # Host Bridge Traits
//!
//! Contracts between the non-stream audio engine and the host application.
//!
//! ## Overview
//!
//! The engine never touches files, sockets or the host's logging system
//! directly. Each capability it needs from the outside world is a trait here,
//! implemented once per platform (see `bridge-desktop` for desktop
//! implementations).
//!
//! ## Traits
//!
//! - [`UpstreamSource`](source::UpstreamSource) - Encoded bytes, in pull or push mode
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep messages actionable (include
//! the path or range that failed).
//!
//! ## Thread Safety
//!
//! On native targets every bridge trait requires `Send + Sync` through
//! [`PlatformSendSync`](platform::PlatformSendSync) so implementations can be
//! shared with the engine's driving task.

pub mod error;
pub mod logging;
pub mod platform;
pub mod source;

pub use error::BridgeError;

// Re-export commonly used types
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use platform::PlatformSendSync;
pub use source::{SchedulingMode, UpstreamSource};
