//! Task lifecycle events
//!
//! Events are broadcast via [`EventBus`] and serialised verbatim for SSE
//! transmission. Publishing never blocks; slow subscribers lag and drop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{TaskKind, TaskState};

/// Task lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task left the pending state
    TaskStarted {
        task_id: Uuid,
        kind: TaskKind,
        timestamp: DateTime<Utc>,
    },

    /// Progress advanced on a running task
    TaskProgress {
        task_id: Uuid,
        progress: f64,
        processed: usize,
        total: usize,
        current_operation: String,
        timestamp: DateTime<Utc>,
    },

    /// A task reached a terminal state
    TaskFinished {
        task_id: Uuid,
        state: TaskState,
        timestamp: DateTime<Utc>,
    },
}

impl TaskEvent {
    /// Event type as a string, for SSE event names
    pub fn event_type(&self) -> &'static str {
        match self {
            TaskEvent::TaskStarted { .. } => "task_started",
            TaskEvent::TaskProgress { .. } => "task_progress",
            TaskEvent::TaskFinished { .. } => "task_finished",
        }
    }
}

/// Central event distribution bus.
///
/// Backed by `tokio::broadcast`: non-blocking publish, any number of
/// subscribers, lagged-message detection for slow ones.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A send with no live subscribers is not an error.
    pub fn emit(&self, event: TaskEvent) {
        if let Err(err) = self.tx.send(event) {
            tracing::trace!(error = %err, "event dropped: no subscribers");
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
