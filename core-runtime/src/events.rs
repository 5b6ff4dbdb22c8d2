//! # Event Bus System
//!
//! Host-facing notifications from engine instances, delivered over
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! Downstream consumers see buffers and stream events (segments, EOS, flushes)
//! through their sink. Everything the *application* should hear about goes
//! through the bus instead: a file finished loading, a sub-segment seek
//! started, the decoder looped, a seek was refused, a load failed.
//!
//! - **Event Types**: [`PlaybackEvent`] for stream lifecycle, [`AlertEvent`]
//!   for warnings and errors
//! - **EventBus**: Broadcast channel shared by any number of engines
//! - **EventStream**: Receiver wrapper with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │  Engine #1   ├──────────────>│           │     subscribe    ┌────────────┐
//! └──────────────┘               │ EventBus  ├─────────────────>│ Subscriber │
//!                                │ (broadcast│                  └────────────┘
//! ┌──────────────┐     emit      │  channel) │     subscribe    ┌────────────┐
//! │  Engine #2   ├──────────────>│           ├─────────────────>│ Subscriber │
//! └──────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Playback(PlaybackEvent::EndOfMedia {
//!         engine_id: "engine-1".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "End of media reached");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender is gone, treat as shutdown.
//!
//! Engines ignore the "no subscribers" error from [`EventBus::emit`]; nobody
//! listening is a normal situation.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that fall further behind receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Stream lifecycle notifications
    Playback(PlaybackEvent),
    /// Warnings and errors
    Alert(AlertEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Alert(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Alert(AlertEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Alert(AlertEvent::Warning { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Loaded { .. }) => EventSeverity::Info,
            CoreEvent::Playback(PlaybackEvent::EndOfMedia { .. }) => EventSeverity::Info,
            CoreEvent::Playback(PlaybackEvent::SubsongChanged { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Identifier of the engine instance that emitted the event.
    pub fn engine_id(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.engine_id(),
            CoreEvent::Alert(e) => e.engine_id(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Stream lifecycle events. Times are nanoseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The whole source was loaded and accepted by the decoder.
    Loaded {
        engine_id: String,
        /// Total duration of the current subsong, when known.
        duration_ns: Option<u64>,
        num_subsongs: u32,
    },
    /// Metadata extracted at load time.
    Tags {
        engine_id: String,
        title: Option<String>,
        comment: Option<String>,
    },
    /// A segment seek started a new sub-segment at this position.
    SegmentStart { engine_id: String, position_ns: u64 },
    /// The decoder crossed a loop point and jumped back.
    LoopBoundary {
        engine_id: String,
        /// Loops taken since the counter was last reset.
        count: u32,
        /// Position playback continues from.
        position_ns: u64,
    },
    /// A different subsong is now playing.
    SubsongChanged {
        engine_id: String,
        index: u32,
        duration_ns: Option<u64>,
    },
    /// The decoder reported end of media.
    EndOfMedia { engine_id: String },
    /// The driving task paused.
    Paused { engine_id: String, reason: String },
    /// The driving task resumed.
    Resumed { engine_id: String },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Loaded { .. } => "Media loaded",
            PlaybackEvent::Tags { .. } => "Metadata found",
            PlaybackEvent::SegmentStart { .. } => "Segment started",
            PlaybackEvent::LoopBoundary { .. } => "Loop point crossed",
            PlaybackEvent::SubsongChanged { .. } => "Subsong changed",
            PlaybackEvent::EndOfMedia { .. } => "End of media reached",
            PlaybackEvent::Paused { .. } => "Driving task paused",
            PlaybackEvent::Resumed { .. } => "Driving task resumed",
        }
    }

    fn engine_id(&self) -> &str {
        match self {
            PlaybackEvent::Loaded { engine_id, .. }
            | PlaybackEvent::Tags { engine_id, .. }
            | PlaybackEvent::SegmentStart { engine_id, .. }
            | PlaybackEvent::LoopBoundary { engine_id, .. }
            | PlaybackEvent::SubsongChanged { engine_id, .. }
            | PlaybackEvent::EndOfMedia { engine_id }
            | PlaybackEvent::Paused { engine_id, .. }
            | PlaybackEvent::Resumed { engine_id } => engine_id,
        }
    }
}

// ============================================================================
// Alert Events
// ============================================================================

/// Warnings and errors surfaced to the application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AlertEvent {
    /// Something failed but playback state is intact (e.g. a refused seek).
    Warning { engine_id: String, message: String },
    /// A stream error. `fatal` errors stop all further processing.
    Error {
        engine_id: String,
        message: String,
        fatal: bool,
    },
}

impl AlertEvent {
    fn description(&self) -> &str {
        match self {
            AlertEvent::Warning { .. } => "Warning",
            AlertEvent::Error { fatal: true, .. } => "Fatal stream error",
            AlertEvent::Error { .. } => "Stream error",
        }
    }

    fn engine_id(&self) -> &str {
        match self {
            AlertEvent::Warning { engine_id, .. } | AlertEvent::Error { engine_id, .. } => {
                engine_id
            }
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use core_runtime::events::EventBus;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let event_bus = EventBus::new(100);
    /// let mut subscriber = event_bus.subscribe();
    ///
    /// tokio::spawn(async move {
    ///     while let Ok(event) = subscriber.recv().await {
    ///         println!("Received: {:?}", event);
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let event_bus = EventBus::new(100);
/// let alerts = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Alert(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
