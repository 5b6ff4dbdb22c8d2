//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileSource` reads a file with `tokio::fs` and answers range requests
//!   (pull mode).
//! - `MemorySource` wraps bytes already in memory. It can pretend to be a
//!   push-only source, which is how the push activation path is exercised
//!   without a real network stream.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::FileSource;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = Arc::new(FileSource::open("song.it").await.unwrap());
//!     let handle = engine.activate(source).unwrap();
//! }
//! ```

mod filesystem;
mod memory;

pub use filesystem::FileSource;
pub use memory::MemorySource;
