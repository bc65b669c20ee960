//! Engine events for observing a review queue as it progresses.
//!
//! The [`QueueOrchestrator`](crate::QueueOrchestrator) publishes an
//! [`EngineEvent`] at every run boundary and phase change. Any number of
//! in-process subscribers may listen; events sent while nobody listens are
//! dropped.
//!
//! # Event Types
//!
//! - `run_started` - A run opened for an item
//! - `phase_changed` - The active run moved to another phase
//! - `run_completed` - A run exited (persisted or aborted)
//! - `queue_advanced` - The next queued item is about to open
//! - `queue_drained` - The last queued item finished
//! - `error` - Opening a run failed
//!
//! # Example
//!
//! ```
//! use retake_engine::events::{EngineEvent, EventBroadcaster};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(16);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(EngineEvent::queue_drained(3));
//!
//! if let Ok(event) = receiver.recv().await {
//!     assert_eq!(event.event_name(), "queue_drained");
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::run_state::{RunMode, RunPhase};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `run_started` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStartedPayload {
    /// Item the run is for.
    pub item_id: String,
    /// Run mode.
    pub mode: RunMode,
    /// Number of screens in the lesson.
    pub screens: usize,
    /// When the run opened.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `phase_changed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseChangedPayload {
    /// Item the run is for.
    pub item_id: String,
    /// Phase before the event.
    pub from: RunPhase,
    /// Phase after the event.
    pub to: RunPhase,
}

/// Payload for the `run_completed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCompletedPayload {
    /// Item the run was for.
    pub item_id: String,
    /// `false` when the learner aborted.
    pub persisted: bool,
    /// Quality committed to the scheduler, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    /// Mistakes folded into the ledger.
    pub mistakes: usize,
    /// XP earned.
    pub xp: u32,
}

/// Payload for the `queue_advanced` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueAdvancedPayload {
    /// The item about to open.
    pub next_item_id: String,
    /// Items still queued, including `next_item_id`.
    pub remaining: usize,
}

/// Payload for the `queue_drained` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDrainedPayload {
    /// Runs completed since the queue started.
    pub completed: usize,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error description.
    pub message: String,
}

// ============================================================================
// EngineEvent
// ============================================================================

/// Events emitted while a queue runs.
///
/// Serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A run opened.
    RunStarted(RunStartedPayload),
    /// The active run changed phase.
    PhaseChanged(PhaseChangedPayload),
    /// A run exited.
    RunCompleted(RunCompletedPayload),
    /// The queue moved on to its next item.
    QueueAdvanced(QueueAdvancedPayload),
    /// The queue emptied.
    QueueDrained(QueueDrainedPayload),
    /// Something went wrong opening a run.
    Error(ErrorPayload),
}

impl EngineEvent {
    /// Creates a `RunStarted` event.
    #[must_use]
    pub fn run_started(item_id: impl Into<String>, mode: RunMode, screens: usize) -> Self {
        Self::RunStarted(RunStartedPayload {
            item_id: item_id.into(),
            mode,
            screens,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `PhaseChanged` event.
    #[must_use]
    pub fn phase_changed(item_id: impl Into<String>, from: RunPhase, to: RunPhase) -> Self {
        Self::PhaseChanged(PhaseChangedPayload {
            item_id: item_id.into(),
            from,
            to,
        })
    }

    /// Creates a `RunCompleted` event.
    #[must_use]
    pub const fn run_completed(
        item_id: String,
        persisted: bool,
        quality: Option<u8>,
        mistakes: usize,
        xp: u32,
    ) -> Self {
        Self::RunCompleted(RunCompletedPayload {
            item_id,
            persisted,
            quality,
            mistakes,
            xp,
        })
    }

    /// Creates a `QueueAdvanced` event.
    #[must_use]
    pub fn queue_advanced(next_item_id: impl Into<String>, remaining: usize) -> Self {
        Self::QueueAdvanced(QueueAdvancedPayload {
            next_item_id: next_item_id.into(),
            remaining,
        })
    }

    /// Creates a `QueueDrained` event.
    #[must_use]
    pub const fn queue_drained(completed: usize) -> Self {
        Self::QueueDrained(QueueDrainedPayload { completed })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::RunStarted(_) => "run_started",
            Self::PhaseChanged(_) => "phase_changed",
            Self::RunCompleted(_) => "run_completed",
            Self::QueueAdvanced(_) => "queue_advanced",
            Self::QueueDrained(_) => "queue_drained",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Fans engine events out to every subscriber.
///
/// Backed by a tokio broadcast channel; events are not kept for late
/// subscribers.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster whose subscribers each buffer `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls more than `capacity` events behind receives a
    /// `Lagged` error and misses the oldest events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Returns how many subscribers will see it.
    pub fn send(&self, event: EngineEvent) -> usize {
        // Err only means nobody is listening.
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// Tests
// ============================================================================
