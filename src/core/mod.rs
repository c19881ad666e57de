//! Core domain models: tasks, their execution state, and the phase DAG.

pub mod dag;
pub mod execution;
pub mod task;

pub use dag::PhaseGraph;
pub use execution::{
    CostTracking, ExecutionState, GateDecision, PhaseState, PhaseStatus, RetryContext,
    SessionInfo, TokenUsage, ValidationDecision, ValidationEntry,
};
pub use task::{ExecutorClaim, Task, TaskId, TaskStatus};
