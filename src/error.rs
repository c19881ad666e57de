use thiserror::Error;

use crate::core::task::{TaskId, TaskStatus};
use crate::gate::DecisionId;
use crate::workflow::validate::ValidationIssue;
use crate::workflow::WorkflowId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Workflow {workflow} failed validation with {} issue(s)", issues.len())]
    Validation {
        workflow: WorkflowId,
        issues: Vec<ValidationIssue>,
    },

    #[error("Task {0} is already running")]
    AlreadyRunning(TaskId),

    #[error("Task {0} has no resume point")]
    NoResumePoint(TaskId),

    #[error("Gate {decision} for phase {phase} timed out or was cancelled")]
    GateTimeoutOrCancelled { decision: DecisionId, phase: String },

    #[error("Phase {phase} failed: {message}")]
    PhaseRunner { phase: String, message: String },

    #[error("Task {task} left in inconsistent state: {detail}")]
    InconsistentState { task: TaskId, detail: String },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    #[error("Phase template not found: {0}")]
    PhaseTemplateNotFound(String),

    #[error("Gate decision not found: {0}")]
    DecisionNotFound(DecisionId),

    #[error("Gate decision already made: {0}")]
    AlreadyDecided(DecisionId),

    #[error("Built-in definition cannot be modified: {0}")]
    BuiltinImmutable(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: TaskStatus, to: TaskStatus },

    #[error("Task {task} cannot run from status {status}")]
    TaskNotRunnable { task: TaskId, status: TaskStatus },

    #[error("Task {task} is not orphaned: {detail}")]
    NotOrphaned { task: TaskId, detail: String },

    #[error("Store is closed")]
    StoreClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
