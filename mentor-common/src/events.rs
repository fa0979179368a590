//! Pipeline event types and broadcast bus
//!
//! Events are emitted by the stage orchestrator and forwarded to SSE clients.
//! Emission never blocks the pipeline; with no subscribers an event is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MentorEvent {
    /// A pipeline run began for a session
    PipelineStarted {
        session_id: Uuid,
        /// True when the run follows a destructive restart
        restart: bool,
        timestamp: DateTime<Utc>,
    },

    /// A stage produced and persisted its artifact
    StageCompleted {
        session_id: Uuid,
        stage: String,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A stage found its artifact already stored and did nothing
    StageSkipped {
        session_id: Uuid,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// Session reached `complete`
    PipelineCompleted {
        session_id: Uuid,
        mentor_score: f64,
        grade: String,
        timestamp: DateTime<Utc>,
    },

    /// Session reached `failed`
    PipelineFailed {
        session_id: Uuid,
        /// Stage that raised the error, when known
        stage: Option<String>,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// All artifacts were wiped and the session returned to `pending`
    SessionReset {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl MentorEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            MentorEvent::PipelineStarted { .. } => "PipelineStarted",
            MentorEvent::StageCompleted { .. } => "StageCompleted",
            MentorEvent::StageSkipped { .. } => "StageSkipped",
            MentorEvent::PipelineCompleted { .. } => "PipelineCompleted",
            MentorEvent::PipelineFailed { .. } => "PipelineFailed",
            MentorEvent::SessionReset { .. } => "SessionReset",
        }
    }

    /// Session the event refers to
    pub fn session_id(&self) -> Uuid {
        match self {
            MentorEvent::PipelineStarted { session_id, .. }
            | MentorEvent::StageCompleted { session_id, .. }
            | MentorEvent::StageSkipped { session_id, .. }
            | MentorEvent::PipelineCompleted { session_id, .. }
            | MentorEvent::PipelineFailed { session_id, .. }
            | MentorEvent::SessionReset { session_id, .. } => *session_id,
        }
    }
}

/// Broadcast bus for pipeline events
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MentorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a bus buffering `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MentorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MentorEvent,
    ) -> Result<usize, broadcast::error::SendError<MentorEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: MentorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
