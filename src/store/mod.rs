//! Durable storage for tasks and workflow definitions.
//!
//! Each project owns one [`Store`]. The scheduler reads definitions and
//! reads and writes tasks through it; definition writes go through
//! [`DefinitionService`] so built-ins stay immutable.

mod cache;
mod definitions;
mod file;
mod memory;
pub mod seed;

use crate::core::task::{Task, TaskId};
use crate::workflow::{PhaseTemplate, Workflow, WorkflowId, WorkflowPhase};
use crate::Result;

pub use cache::{OpenStore, ProjectCache, ProjectId, StoreHandle};
pub use definitions::DefinitionService;
pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Persistence for one project. Calls are synchronous and
/// read-after-write consistent; async callers go through
/// [`crate::util::blocking`].
pub trait Store: Send + Sync {
    fn load_task(&self, id: &TaskId) -> Result<Option<Task>>;
    fn save_task(&self, task: &Task) -> Result<()>;
    fn delete_task(&self, id: &TaskId) -> Result<()>;
    fn list_tasks(&self) -> Result<Vec<Task>>;

    fn load_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>>;
    fn save_workflow(&self, workflow: &Workflow) -> Result<()>;
    /// Delete a workflow together with its phases.
    fn delete_workflow(&self, id: &WorkflowId) -> Result<()>;
    fn list_workflows(&self) -> Result<Vec<Workflow>>;

    /// Phases of a workflow ordered by sequence; empty if none are stored.
    fn get_workflow_phases(&self, id: &WorkflowId) -> Result<Vec<WorkflowPhase>>;
    fn save_workflow_phases(&self, id: &WorkflowId, phases: &[WorkflowPhase]) -> Result<()>;

    fn get_phase_template(&self, id: &str) -> Result<Option<PhaseTemplate>>;
    fn save_phase_template(&self, template: &PhaseTemplate) -> Result<()>;
    fn delete_phase_template(&self, id: &str) -> Result<()>;
    fn list_phase_templates(&self) -> Result<Vec<PhaseTemplate>>;

    /// Release the store. Later calls fail with `Error::StoreClosed`.
    fn close(&self);
    fn is_closed(&self) -> bool;
}

pub(crate) fn sort_phases(phases: &mut [WorkflowPhase]) {
    phases.sort_by(|a, b| (a.sequence, a.id()).cmp(&(b.sequence, b.id())));
}
