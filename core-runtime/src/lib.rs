//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the engine crates:
//! - Logging and tracing infrastructure
//! - Runtime configuration
//! - Event bus for host notifications
//!
//! ## Overview
//!
//! Nothing in here knows how to decode audio. It establishes the logging
//! conventions and the broadcast channel through which engine instances
//! report loads, loops, warnings and errors to the application.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
