//! Task data model.
//!
//! A task is one unit of work driven through a workflow. It carries its
//! lifecycle status, the phase it last worked on, the claim of the process
//! executing it, and the embedded execution state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::execution::ExecutionState;
use crate::workflow::WorkflowId;
use crate::{Error, Result};

/// Identifier of a task, e.g. `TASK-3f2a91c0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh task identifier.
    pub fn new() -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("TASK-{}", &uuid[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Task status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Created,
    Classifying,
    Planned,
    Running,
    Paused,
    Blocked,
    Finalizing,
    Completed,
    Failed,
    Resolved,
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Created => 0,
            TaskStatus::Classifying => 1,
            TaskStatus::Planned => 2,
            TaskStatus::Running => 3,
            TaskStatus::Paused | TaskStatus::Blocked => 4,
            TaskStatus::Finalizing => 5,
            TaskStatus::Completed | TaskStatus::Failed => 6,
            TaskStatus::Resolved => 7,
        }
    }

    /// Whether a task may move from `self` to `to`.
    ///
    /// Status only moves forward, except that paused, blocked and failed
    /// tasks may resume (back to running) and completed or failed tasks may
    /// be re-planned for another run.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        if self == to {
            return true;
        }
        match (self, to) {
            (TaskStatus::Paused | TaskStatus::Blocked | TaskStatus::Failed, TaskStatus::Running) => {
                true
            }
            (TaskStatus::Completed | TaskStatus::Failed, TaskStatus::Planned) => true,
            _ => to.rank() > self.rank(),
        }
    }

    /// Whether a run may start from this status.
    pub fn is_runnable(self) -> bool {
        self != TaskStatus::Running && self.can_transition_to(TaskStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Resolved
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Classifying => "classifying",
            TaskStatus::Planned => "planned",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Finalizing => "finalizing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(TaskStatus::Created),
            "classifying" => Ok(TaskStatus::Classifying),
            "planned" => Ok(TaskStatus::Planned),
            "running" => Ok(TaskStatus::Running),
            "paused" => Ok(TaskStatus::Paused),
            "blocked" => Ok(TaskStatus::Blocked),
            "finalizing" => Ok(TaskStatus::Finalizing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "resolved" => Ok(TaskStatus::Resolved),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Record of the process that claimed a running task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorClaim {
    pub pid: u32,
    /// Process start time in clock ticks since boot, used to detect PID reuse.
    pub start_time: Option<u64>,
    pub hostname: String,
    pub claimed_at: DateTime<Utc>,
    pub heartbeat_at: Option<DateTime<Utc>>,
}

impl ExecutorClaim {
    /// Claim on behalf of the current process.
    pub fn current(start_time: Option<u64>) -> Self {
        Self {
            pid: std::process::id(),
            start_time,
            hostname: local_hostname(),
            claimed_at: Utc::now(),
            heartbeat_at: None,
        }
    }

    /// Record that the claiming process is still making progress.
    pub fn heartbeat(&mut self) {
        self.heartbeat_at = Some(Utc::now());
    }
}

/// Best-effort hostname of this machine.
pub fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

/// A task driven through a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    /// Phase the task is currently on, or last worked on.
    pub current_phase: Option<String>,
    pub branch: Option<String>,
    pub workflow_id: Option<WorkflowId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub executor: Option<ExecutorClaim>,
    #[serde(default)]
    pub execution: ExecutionState,
}

impl Task {
    /// Create a new task in `created` status.
    pub fn new(id: impl Into<TaskId>, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.to_string(),
            description: String::new(),
            status: TaskStatus::Created,
            current_phase: None,
            branch: None,
            workflow_id: None,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            executor: None,
            execution: ExecutionState::default(),
        }
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<WorkflowId>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    /// Move the task to a new status, enforcing the transition rules.
    pub fn set_status(&mut self, to: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidStatusTransition {
                from: self.status,
                to,
            });
        }
        if self.status == to {
            return Ok(());
        }
        let now = Utc::now();
        match to {
            TaskStatus::Running if self.started_at.is_none() => self.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed => self.completed_at = Some(now),
            TaskStatus::Planned => self.completed_at = None,
            _ => {}
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the task has any recorded progress to resume from.
    pub fn has_progress(&self) -> bool {
        self.current_phase.is_some()
            || self.execution.retry_context.is_some()
            || self.execution.phases.values().any(|p| p.iterations > 0)
    }
}
