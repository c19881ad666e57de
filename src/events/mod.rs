//! Execution events and their distribution to live observers.
//!
//! The scheduler publishes through the [`EventSink`] seam. The
//! [`EventBroadcaster`] fans events out to per-subscriber mailboxes without
//! ever blocking the publisher.

mod broadcaster;
mod session;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::execution::ExecutionState;
use crate::core::task::{TaskId, TaskStatus};
use crate::gate::DecisionId;

pub use broadcaster::{
    EventBroadcaster, SubscriberId, Subscription, Topic, DEFAULT_MAILBOX_CAPACITY,
};
pub use session::{SessionSource, SessionSummary, SessionTracker};

/// Topic name observers use to subscribe to every task.
pub const GLOBAL: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    TaskUpdated {
        status: TaskStatus,
        current_phase: Option<String>,
    },
    PhaseStarted {
        phase: String,
        iteration: u32,
    },
    PhaseCompleted {
        phase: String,
        commit: Option<String>,
    },
    PhaseSkipped {
        phase: String,
        reason: String,
    },
    PhaseFailed {
        phase: String,
        error: String,
        will_retry: bool,
    },
    GateRequested {
        phase: String,
        decision: DecisionId,
    },
    GateDecided {
        phase: String,
        approved: bool,
        reason: Option<String>,
    },
    Error {
        phase: Option<String>,
        message: String,
    },
    /// Final execution snapshot published when a run exits.
    State {
        status: TaskStatus,
        execution: Box<ExecutionState>,
    },
    Complete {
        status: TaskStatus,
    },
    SessionUpdate(SessionSummary),
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::TaskUpdated { .. } => "task_updated",
            EventKind::PhaseStarted { .. }
            | EventKind::PhaseCompleted { .. }
            | EventKind::PhaseSkipped { .. }
            | EventKind::PhaseFailed { .. } => "phase",
            EventKind::GateRequested { .. } | EventKind::GateDecided { .. } => "gate",
            EventKind::Error { .. } => "error",
            EventKind::State { .. } => "state",
            EventKind::Complete { .. } => "complete",
            EventKind::SessionUpdate(_) => "session_update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// `None` for session-wide events.
    pub task_id: Option<TaskId>,
    pub kind: EventKind,
    pub time: DateTime<Utc>,
}

impl Event {
    pub fn task(task_id: &TaskId, kind: EventKind) -> Self {
        Self {
            task_id: Some(task_id.clone()),
            kind,
            time: Utc::now(),
        }
    }

    pub fn global(kind: EventKind) -> Self {
        Self {
            task_id: None,
            kind,
            time: Utc::now(),
        }
    }
}

/// Fire-and-forget event publication.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}
