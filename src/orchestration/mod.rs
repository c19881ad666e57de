//! Orchestration layer: running tasks through their workflows.
//!
//! The [`Executor`] drives one task per tokio task, consulting the resume
//! planner for where to start, the gate broker for approvals and the retry
//! policy on failure. The orphan detector finds runs whose process died.

pub mod orphan;
pub mod planner;
mod reconcile;
mod registry;
pub mod retry;
mod runner;
mod scheduler;

pub use orphan::{
    release_orphan, OrphanDetector, OrphanReason, OrphanStatus, ProcessIdentity, ProcessProbe,
    ProcfsProbe,
};
pub use planner::{plan_resume, plan_start};
pub use reconcile::reconcile;
pub use registry::{RunGuard, RunInfo, RunningTasks};
pub use retry::{build_retry_prompt, default_retry_map, RetryPolicy, RetryTracker};
pub use runner::{resolve_prompt, PhaseInput, PhaseOutput, PhaseRunner};
pub use scheduler::{Executor, ExecutorConfig, RunHandle, DEFAULT_STORE_TIMEOUT};
