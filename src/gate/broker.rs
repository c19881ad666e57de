//! Human approval gates awaiting a decision.
//!
//! The scheduler registers a gate and awaits its ticket; an external caller
//! posts the decision. Each gate is fulfilled at most once.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::task::TaskId;
use crate::util::lock;
use crate::{Error, Result};

/// Identifier of a pending gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(pub Uuid);

impl DecisionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DecisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DecisionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub approved: bool,
    pub reason: Option<String>,
}

impl GateOutcome {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    pub fn reject(reason: &str) -> Self {
        Self {
            approved: false,
            reason: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

/// Snapshot of a registered gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGate {
    pub id: DecisionId,
    pub task_id: TaskId,
    pub phase: String,
    pub requested_at: DateTime<Utc>,
}

enum GateState {
    Waiting(oneshot::Sender<GateOutcome>),
    Decided(bool),
    Cancelled,
}

struct GateEntry {
    task_id: TaskId,
    phase: String,
    requested_at: DateTime<Utc>,
    state: GateState,
}

/// Handle held by the scheduler while a gate is open.
#[derive(Debug)]
pub struct DecisionTicket {
    pub id: DecisionId,
    pub phase: String,
    rx: oneshot::Receiver<GateOutcome>,
}

impl DecisionTicket {
    /// Wait for the decision. Cancellation, an elapsed timeout, or the gate
    /// being cancelled in the broker all yield `GateTimeoutOrCancelled`.
    pub async fn wait(
        self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<GateOutcome> {
        let expired = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        let gone = || Error::GateTimeoutOrCancelled {
            decision: self.id,
            phase: self.phase.clone(),
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(gone()),
            outcome = self.rx => outcome.map_err(|_| gone()),
            _ = expired => Err(gone()),
        }
    }
}

#[derive(Default)]
pub struct GateBroker {
    entries: Mutex<HashMap<DecisionId, GateEntry>>,
}

impl GateBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gate and return immediately with a ticket to await.
    pub fn request_decision(&self, task_id: &TaskId, phase: &str) -> DecisionTicket {
        let id = DecisionId::new();
        let (tx, rx) = oneshot::channel();
        lock(&self.entries).insert(
            id,
            GateEntry {
                task_id: task_id.clone(),
                phase: phase.to_string(),
                requested_at: Utc::now(),
                state: GateState::Waiting(tx),
            },
        );
        info!(task = %task_id, phase, decision = %id.short(), "gate awaiting decision");
        DecisionTicket {
            id,
            phase: phase.to_string(),
            rx,
        }
    }

    /// Fulfil a pending gate exactly once.
    pub fn post_decision(&self, id: &DecisionId, approved: bool, reason: Option<String>) -> Result<()> {
        let mut entries = lock(&self.entries);
        let entry = entries.get_mut(id).ok_or(Error::DecisionNotFound(*id))?;
        match std::mem::replace(&mut entry.state, GateState::Decided(approved)) {
            GateState::Waiting(tx) => {
                // The waiter may already be gone; the decision is still recorded.
                let _ = tx.send(GateOutcome { approved, reason });
                info!(task = %entry.task_id, phase = %entry.phase, approved, "gate decided");
                Ok(())
            }
            previous => {
                entry.state = previous;
                Err(Error::AlreadyDecided(*id))
            }
        }
    }

    /// Unblock the waiter with a cancelled outcome. Returns whether the gate
    /// was still pending.
    pub fn cancel(&self, id: &DecisionId) -> bool {
        let mut entries = lock(&self.entries);
        match entries.get_mut(id) {
            Some(entry) if matches!(entry.state, GateState::Waiting(_)) => {
                entry.state = GateState::Cancelled;
                debug!(task = %entry.task_id, phase = %entry.phase, "gate cancelled");
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, id: &DecisionId) -> Option<GateStatus> {
        lock(&self.entries).get(id).map(|entry| match entry.state {
            GateState::Waiting(_) => GateStatus::Pending,
            GateState::Decided(true) => GateStatus::Approved,
            GateState::Decided(false) => GateStatus::Rejected,
            GateState::Cancelled => GateStatus::Cancelled,
        })
    }

    pub fn get(&self, id: &DecisionId) -> Option<PendingGate> {
        lock(&self.entries).get(id).map(|e| PendingGate {
            id: *id,
            task_id: e.task_id.clone(),
            phase: e.phase.clone(),
            requested_at: e.requested_at,
        })
    }

    /// Gates still waiting, oldest first, optionally for one task.
    pub fn list_pending(&self, task_id: Option<&TaskId>) -> Vec<PendingGate> {
        let mut pending: Vec<PendingGate> = lock(&self.entries)
            .iter()
            .filter(|(_, e)| matches!(e.state, GateState::Waiting(_)))
            .filter(|(_, e)| task_id.map_or(true, |t| &e.task_id == t))
            .map(|(id, e)| PendingGate {
                id: *id,
                task_id: e.task_id.clone(),
                phase: e.phase.clone(),
                requested_at: e.requested_at,
            })
            .collect();
        pending.sort_by_key(|g| g.requested_at);
        pending
    }

    /// Forget every gate of a task, cancelling any still waiting.
    pub fn release_task(&self, task_id: &TaskId) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, e| &e.task_id != task_id);
        before - entries.len()
    }
}
