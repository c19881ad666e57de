//! In-memory store, used by tests and embedders without a project directory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::core::task::{Task, TaskId};
use crate::store::{sort_phases, Store};
use crate::util::lock;
use crate::workflow::{PhaseTemplate, Workflow, WorkflowId, WorkflowPhase};
use crate::{Error, Result};

#[derive(Default)]
struct Tables {
    tasks: BTreeMap<TaskId, Task>,
    workflows: BTreeMap<WorkflowId, Workflow>,
    phases: BTreeMap<WorkflowId, Vec<WorkflowPhase>>,
    templates: BTreeMap<String, PhaseTemplate>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        if self.is_closed() {
            return Err(Error::StoreClosed);
        }
        Ok(lock(&self.tables))
    }
}

impl Store for MemoryStore {
    fn load_task(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tables()?.tasks.get(id).cloned())
    }

    fn save_task(&self, task: &Task) -> Result<()> {
        self.tables()?.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn delete_task(&self, id: &TaskId) -> Result<()> {
        self.tables()?.tasks.remove(id);
        Ok(())
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.tables()?.tasks.values().cloned().collect())
    }

    fn load_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        Ok(self.tables()?.workflows.get(id).cloned())
    }

    fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.tables()?
            .workflows
            .insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    fn delete_workflow(&self, id: &WorkflowId) -> Result<()> {
        let mut tables = self.tables()?;
        tables.workflows.remove(id);
        tables.phases.remove(id);
        Ok(())
    }

    fn list_workflows(&self) -> Result<Vec<Workflow>> {
        Ok(self.tables()?.workflows.values().cloned().collect())
    }

    fn get_workflow_phases(&self, id: &WorkflowId) -> Result<Vec<WorkflowPhase>> {
        Ok(self.tables()?.phases.get(id).cloned().unwrap_or_default())
    }

    fn save_workflow_phases(&self, id: &WorkflowId, phases: &[WorkflowPhase]) -> Result<()> {
        let mut phases = phases.to_vec();
        sort_phases(&mut phases);
        self.tables()?.phases.insert(id.clone(), phases);
        Ok(())
    }

    fn get_phase_template(&self, id: &str) -> Result<Option<PhaseTemplate>> {
        Ok(self.tables()?.templates.get(id).cloned())
    }

    fn save_phase_template(&self, template: &PhaseTemplate) -> Result<()> {
        self.tables()?
            .templates
            .insert(template.id.clone(), template.clone());
        Ok(())
    }

    fn delete_phase_template(&self, id: &str) -> Result<()> {
        self.tables()?.templates.remove(id);
        Ok(())
    }

    fn list_phase_templates(&self) -> Result<Vec<PhaseTemplate>> {
        Ok(self.tables()?.templates.values().cloned().collect())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
