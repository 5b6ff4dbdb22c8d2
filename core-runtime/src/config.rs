//! # Core Configuration Module
//!
//! Process-level settings for hosts embedding one or more engines.
//!
//! ## Overview
//!
//! `CoreConfig` is built with a builder and validated before use, so a bad
//! value fails at startup with an actionable message instead of surfacing
//! later as a lagging event subscriber or a silent logger.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_runtime::logging::LogFormat;
//!
//! let config = CoreConfig::builder()
//!     .event_buffer_size(256)
//!     .log_format(LogFormat::Compact)
//!     .build()
//!     .expect("valid runtime config");
//!
//! config.init_logging()?;
//! let bus = config.event_bus();
//! ```

use crate::error::{Error, Result};
use crate::events::{EventBus, DEFAULT_EVENT_BUFFER_SIZE};
use crate::logging::{init_logging, LogFormat, LoggingConfig};
use bridge_traits::logging::{LogLevel, LoggerSink};
use std::sync::Arc;

/// Upper bound for the event channel. Larger buffers only hide a stuck subscriber.
pub const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

/// Runtime configuration shared by every engine in the process.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Capacity of the broadcast channel behind [`EventBus`]
    pub event_buffer_size: usize,

    /// Logging setup applied by [`CoreConfig::init_logging`]
    pub logging: LoggingConfig,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be > 0; engines need at least one slot to \
                 publish load and error notifications"
                    .to_string(),
            ));
        }

        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "event_buffer_size {} exceeds the maximum of {}",
                self.event_buffer_size, MAX_EVENT_BUFFER_SIZE
            )));
        }

        Ok(())
    }

    /// Install the global `tracing` subscriber described by `logging`.
    pub fn init_logging(&self) -> Result<()> {
        init_logging(self.logging.clone())
    }

    /// Create an event bus sized from this configuration.
    pub fn event_bus(&self) -> EventBus {
        EventBus::new(self.event_buffer_size)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            logging: LoggingConfig::default(),
        }
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    event_buffer_size: Option<usize>,
    logging: Option<LoggingConfig>,
    log_level: Option<LogLevel>,
    log_format: Option<LogFormat>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
}

impl CoreConfigBuilder {
    /// Set the event bus capacity (default: 100).
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Replace the whole logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }

    /// Mirror log events into a host logger.
    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Build and validate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a value is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let mut logging = self.logging.unwrap_or_default();
        if let Some(level) = self.log_level {
            logging = logging.with_level(level);
        }
        if let Some(format) = self.log_format {
            logging = logging.with_format(format);
        }
        if let Some(sink) = self.logger_sink {
            logging = logging.with_logger_sink(sink);
        }

        let config = CoreConfig {
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            logging,
        };

        config.validate()?;
        Ok(config)
    }
}
