//! # Event Bus
//!
//! Fire-and-forget progress and log streaming for scan and sync runs, built
//! on `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! Producers (scanner, protocol adapters, run coordinator) emit [`RunEvent`]s
//! into a bounded channel; any number of subscribers (UI, websocket fanout,
//! log mirrors) consume them independently. Emitting never blocks and never
//! fails the producing run — a run with no subscribers is valid.
//!
//! ## Overflow policy
//!
//! The broadcast buffer is bounded at construction time. When a subscriber
//! falls behind, the channel drops the *oldest* events for that subscriber
//! and surfaces `RecvError::Lagged(n)` on its next `recv`. The producer is
//! never throttled by a slow or disconnected consumer.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, RunEvent, RunOutcome};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(256);
//! let mut stream = bus.subscribe();
//!
//! bus.status(RunOutcome::Started);
//! bus.log("Scan started");
//! bus.progress(50);
//!
//! assert_eq!(stream.recv().await.unwrap(), RunEvent::Status { outcome: RunOutcome::Started });
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::RecvError;
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that cannot keep up with this many buffered events will
/// observe `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Terminal and initial run states surfaced to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// A run has started.
    Started,
    /// The run finished successfully.
    Completed,
    /// The run failed or was cancelled.
    Error,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Started => write!(f, "started"),
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Error => write!(f, "error"),
        }
    }
}

/// A single event in the run progress stream. Never persisted; consumed
/// immediately by subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum RunEvent {
    /// Human-readable log line.
    Log {
        /// Message text.
        message: String,
    },
    /// Progress update.
    Progress {
        /// Completion percentage, 0..=100.
        percent: u8,
    },
    /// Run lifecycle transition.
    Status {
        /// The new lifecycle state.
        outcome: RunOutcome,
    },
}

/// Bounded, non-blocking broadcast channel for [`RunEvent`]s.
///
/// Cheap to clone; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// A send error only means there are no subscribers, which is not a
    /// failure for the producer; it is swallowed here.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    /// Emit a log line.
    pub fn log(&self, message: impl Into<String>) {
        self.emit(RunEvent::Log {
            message: message.into(),
        });
    }

    /// Emit a progress update, clamped to 100.
    pub fn progress(&self, percent: u8) {
        self.emit(RunEvent::Progress {
            percent: percent.min(100),
        });
    }

    /// Emit a run status transition.
    pub fn status(&self, outcome: RunOutcome) {
        self.emit(RunEvent::Status { outcome });
    }

    /// Subscribe to the event stream. Each subscriber receives every event
    /// emitted after this call, subject to the overflow policy.
    pub fn subscribe(&self) -> Receiver<RunEvent> {
        self.sender.subscribe()
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut stream = bus.subscribe();

        bus.log("hello");
        bus.progress(42);
        bus.status(RunOutcome::Completed);

        assert_eq!(
            stream.recv().await.unwrap(),
            RunEvent::Log {
                message: "hello".to_string()
            }
        );
        assert_eq!(
            stream.recv().await.unwrap(),
            RunEvent::Progress { percent: 42 }
        );
        assert_eq!(
            stream.recv().await.unwrap(),
            RunEvent::Status {
                outcome: RunOutcome::Completed
            }
        );
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(16);
        // Must not panic or error.
        bus.log("nobody listening");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_progress_clamped() {
        let bus = EventBus::new(16);
        let mut stream = bus.subscribe();
        bus.progress(200);
        assert_eq!(
            stream.recv().await.unwrap(),
            RunEvent::Progress { percent: 100 }
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest() {
        let bus = EventBus::new(1);
        let mut stream = bus.subscribe();

        bus.log("first");
        bus.log("second");
        bus.log("third");

        // Buffer holds one event; the two oldest were dropped for this
        // subscriber and the lag is reported once.
        match stream.recv().await {
            Err(RecvError::Lagged(n)) => assert_eq!(n, 2),
            other => panic!("expected lag, got {:?}", other),
        }
        assert_eq!(
            stream.recv().await.unwrap(),
            RunEvent::Log {
                message: "third".to_string()
            }
        );
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_string(&RunEvent::Progress { percent: 7 }).unwrap();
        assert_eq!(json, r#"{"type":"Progress","payload":{"percent":7}}"#);
    }
}
