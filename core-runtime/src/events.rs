//! # Event Bus System
//!
//! Provides an event-driven channel between the recitation core and its hosts
//! using `tokio::sync::broadcast`. The playback engine and the prefetch
//! coordinator publish typed events; UI layers, diagnostics and tests
//! subscribe independently.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐    emit     ┌───────────┐
//! │ PlaybackEngine ├────────────>│           │    subscribe   ┌────────────┐
//! └────────────────┘             │ EventBus  ├───────────────>│ Subscriber │
//!                                │ (broadcast│                └────────────┘
//! ┌────────────────┐    emit     │  channel) │    subscribe   ┌────────────┐
//! │ Prefetch coord ├────────────>│           ├───────────────>│ Subscriber │
//! └────────────────┘             └───────────┘                └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, PrefetchEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Prefetch(_)));
//!
//! bus.emit(CoreEvent::Prefetch(PrefetchEvent::Progress {
//!     succeeded: 30,
//!     total: 604,
//!     eta_secs: Some(120),
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Page download progress");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal.
//! - **`RecvError::Closed`**: every sender was dropped. Treat as shutdown.
//!
//! Publishing with no subscribers returns `Err`; emitters in this workspace
//! ignore that result since the bus is optional diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Verse playback lifecycle
    Playback(PlaybackEvent),
    /// Bulk page download lifecycle
    Prefetch(PrefetchEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Prefetch(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Skipped { .. }) => EventSeverity::Warning,
            CoreEvent::Prefetch(PrefetchEvent::PartiallyFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Prefetch(PrefetchEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Prefetch(PrefetchEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
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

/// Events emitted by the playback engine.
///
/// Verses are carried as `(surah, verse)` pairs so the runtime crate does not
/// depend on the playback types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// A verse started rendering.
    Started {
        surah: u16,
        verse: u16,
        reciter: String,
        /// Source tier name (`local_primary`, `local_legacy`, `bundled_asset`, `remote`).
        source: String,
    },
    Paused {
        surah: u16,
        verse: u16,
    },
    Resumed {
        surah: u16,
        verse: u16,
    },
    /// Playback was stopped or a sequence ran to its end.
    Stopped,
    /// A verse finished naturally.
    Completed {
        surah: u16,
        verse: u16,
    },
    /// A verse failed inside a page or range sequence and was skipped.
    Skipped {
        surah: u16,
        verse: u16,
        reason: String,
    },
    /// Single-verse playback failed and was surfaced to the user.
    Failed {
        surah: u16,
        verse: u16,
        message: String,
    },
    /// A verse is being served from the network.
    RemoteFallback {
        surah: u16,
        verse: u16,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Started { .. } => "Verse playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped => "Playback stopped",
            PlaybackEvent::Completed { .. } => "Verse completed",
            PlaybackEvent::Skipped { .. } => "Verse skipped after failure",
            PlaybackEvent::Failed { .. } => "Verse playback failed",
            PlaybackEvent::RemoteFallback { .. } => "Verse streamed from network",
        }
    }
}

// ============================================================================
// Prefetch Events
// ============================================================================

/// Events emitted by the bulk page prefetch coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PrefetchEvent {
    Started {
        total: u32,
        parallelism: u32,
    },
    Progress {
        succeeded: u32,
        total: u32,
        /// `None` while the download rate is still unknown.
        eta_secs: Option<u64>,
    },
    /// The run met the success threshold and the cache was marked complete.
    Completed {
        succeeded: u32,
        total: u32,
        duration_secs: u64,
    },
    /// The run finished below the success threshold.
    PartiallyFailed {
        succeeded: u32,
        total: u32,
        missing: u32,
    },
    Cancelled {
        succeeded: u32,
        total: u32,
    },
}

impl PrefetchEvent {
    fn description(&self) -> &str {
        match self {
            PrefetchEvent::Started { .. } => "Page download started",
            PrefetchEvent::Progress { .. } => "Page download progress",
            PrefetchEvent::Completed { .. } => "Page cache complete",
            PrefetchEvent::PartiallyFailed { .. } => "Page download partially failed",
            PrefetchEvent::Cancelled { .. } => "Page download cancelled",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus clones the sender; every `subscribe()` call creates an
/// independent receiver that sees all future events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering `capacity` events per subscriber.
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
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

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

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
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

    /// Only events matching `predicate` are returned by `recv()`/`try_recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
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
