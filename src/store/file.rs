//! JSON file store rooted at `<project>/.orc/`.
//!
//! Layout:
//! - `tasks/<id>.json`
//! - `workflows/<id>.json`
//! - `phases/<workflow-id>.json`
//! - `templates/<id>.json`
//!
//! Writes go to a temporary file that is renamed into place.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::core::task::{Task, TaskId};
use crate::store::{sort_phases, Store};
use crate::workflow::{PhaseTemplate, Workflow, WorkflowId, WorkflowPhase};
use crate::{Error, Result};

const TASKS: &str = "tasks";
const WORKFLOWS: &str = "workflows";
const PHASES: &str = "phases";
const TEMPLATES: &str = "templates";

pub struct JsonFileStore {
    root: PathBuf,
    closed: AtomicBool,
}

impl JsonFileStore {
    /// Open (creating if needed) the store for a project directory.
    pub fn open(project_dir: &Path) -> Result<Self> {
        let root = project_dir.join(".orc");
        for dir in [TASKS, WORKFLOWS, PHASES, TEMPLATES] {
            fs::create_dir_all(root.join(dir))?;
        }
        debug!(root = %root.display(), "opened json file store");
        Ok(Self {
            root,
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, table: &str, id: &str) -> Result<PathBuf> {
        if self.is_closed() {
            return Err(Error::StoreClosed);
        }
        let name: String = id
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        Ok(self.root.join(table).join(format!("{}.json", name)))
    }

    fn read<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>> {
        let path = self.path(table, id)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write<T: Serialize>(&self, table: &str, id: &str, value: &T) -> Result<()> {
        let path = self.path(table, id)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, table: &str, id: &str) -> Result<()> {
        let path = self.path(table, id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        if self.is_closed() {
            return Err(Error::StoreClosed);
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(self.root.join(table))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        paths
            .into_iter()
            .map(|p| -> Result<T> { Ok(serde_json::from_str(&fs::read_to_string(p)?)?) })
            .collect()
    }
}

impl Store for JsonFileStore {
    fn load_task(&self, id: &TaskId) -> Result<Option<Task>> {
        self.read(TASKS, id.as_str())
    }

    fn save_task(&self, task: &Task) -> Result<()> {
        self.write(TASKS, task.id.as_str(), task)
    }

    fn delete_task(&self, id: &TaskId) -> Result<()> {
        self.remove(TASKS, id.as_str())
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        self.list(TASKS)
    }

    fn load_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.read(WORKFLOWS, id.as_str())
    }

    fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.write(WORKFLOWS, workflow.id.as_str(), workflow)
    }

    fn delete_workflow(&self, id: &WorkflowId) -> Result<()> {
        self.remove(PHASES, id.as_str())?;
        self.remove(WORKFLOWS, id.as_str())
    }

    fn list_workflows(&self) -> Result<Vec<Workflow>> {
        self.list(WORKFLOWS)
    }

    fn get_workflow_phases(&self, id: &WorkflowId) -> Result<Vec<WorkflowPhase>> {
        let mut phases: Vec<WorkflowPhase> = self.read(PHASES, id.as_str())?.unwrap_or_default();
        sort_phases(&mut phases);
        Ok(phases)
    }

    fn save_workflow_phases(&self, id: &WorkflowId, phases: &[WorkflowPhase]) -> Result<()> {
        self.write(PHASES, id.as_str(), &phases)
    }

    fn get_phase_template(&self, id: &str) -> Result<Option<PhaseTemplate>> {
        self.read(TEMPLATES, id)
    }

    fn save_phase_template(&self, template: &PhaseTemplate) -> Result<()> {
        self.write(TEMPLATES, &template.id, template)
    }

    fn delete_phase_template(&self, id: &str) -> Result<()> {
        self.remove(TEMPLATES, id)
    }

    fn list_phase_templates(&self) -> Result<Vec<PhaseTemplate>> {
        self.list(TEMPLATES)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(root = %self.root.display(), "closed json file store");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
