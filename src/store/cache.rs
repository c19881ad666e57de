//! Bounded cache of opened per-project stores.
//!
//! `get` hands out shared handles. Evicting or closing a project only drops
//! the cache's reference; the store itself is closed when the last handle
//! goes away, so a run still holding it is never cut off.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::core::task::{Task, TaskId};
use crate::store::Store;
use crate::util::lock;
use crate::workflow::{PhaseTemplate, Workflow, WorkflowId, WorkflowPhase};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(pub String);

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&Path> for ProjectId {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open project store; closes the underlying store on drop.
pub struct OpenStore {
    project: ProjectId,
    inner: Arc<dyn Store>,
}

impl OpenStore {
    pub fn project(&self) -> &ProjectId {
        &self.project
    }
}

impl Drop for OpenStore {
    fn drop(&mut self) {
        debug!(project = %self.project, "closing project store");
        self.inner.close();
    }
}

impl Store for OpenStore {
    fn load_task(&self, id: &TaskId) -> Result<Option<Task>> {
        self.inner.load_task(id)
    }
    fn save_task(&self, task: &Task) -> Result<()> {
        self.inner.save_task(task)
    }
    fn delete_task(&self, id: &TaskId) -> Result<()> {
        self.inner.delete_task(id)
    }
    fn list_tasks(&self) -> Result<Vec<Task>> {
        self.inner.list_tasks()
    }
    fn load_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.inner.load_workflow(id)
    }
    fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.inner.save_workflow(workflow)
    }
    fn delete_workflow(&self, id: &WorkflowId) -> Result<()> {
        self.inner.delete_workflow(id)
    }
    fn list_workflows(&self) -> Result<Vec<Workflow>> {
        self.inner.list_workflows()
    }
    fn get_workflow_phases(&self, id: &WorkflowId) -> Result<Vec<WorkflowPhase>> {
        self.inner.get_workflow_phases(id)
    }
    fn save_workflow_phases(&self, id: &WorkflowId, phases: &[WorkflowPhase]) -> Result<()> {
        self.inner.save_workflow_phases(id, phases)
    }
    fn get_phase_template(&self, id: &str) -> Result<Option<PhaseTemplate>> {
        self.inner.get_phase_template(id)
    }
    fn save_phase_template(&self, template: &PhaseTemplate) -> Result<()> {
        self.inner.save_phase_template(template)
    }
    fn delete_phase_template(&self, id: &str) -> Result<()> {
        self.inner.delete_phase_template(id)
    }
    fn list_phase_templates(&self) -> Result<Vec<PhaseTemplate>> {
        self.inner.list_phase_templates()
    }
    fn close(&self) {
        self.inner.close()
    }
    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

pub type StoreHandle = Arc<OpenStore>;

type Opener = Box<dyn Fn(&ProjectId) -> Result<Arc<dyn Store>> + Send + Sync>;

struct Slot {
    handle: StoreHandle,
    last_used: u64,
}

struct Slots {
    entries: HashMap<ProjectId, Slot>,
    tick: u64,
}

/// LRU cache of at most `capacity` open project stores.
pub struct ProjectCache {
    capacity: usize,
    opener: Opener,
    slots: Mutex<Slots>,
}

impl ProjectCache {
    pub fn new<F>(capacity: usize, opener: F) -> Self
    where
        F: Fn(&ProjectId) -> Result<Arc<dyn Store>> + Send + Sync + 'static,
    {
        Self {
            capacity: capacity.max(1),
            opener: Box::new(opener),
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                tick: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, project: &ProjectId) -> bool {
        lock(&self.slots).entries.contains_key(project)
    }

    /// Return the cached store for a project, opening it if needed and
    /// evicting the least recently used entry when full.
    ///
    /// The opener runs and evicted stores close without the cache locked.
    pub fn get(&self, project: &ProjectId) -> Result<StoreHandle> {
        if let Some(handle) = self.lookup(project) {
            return Ok(handle);
        }

        let handle = Arc::new(OpenStore {
            project: project.clone(),
            inner: (self.opener)(project)?,
        });

        let mut slots = lock(&self.slots);
        slots.tick += 1;
        let tick = slots.tick;
        if let Some(slot) = slots.entries.get_mut(project) {
            // Opened by a concurrent caller; ours closes once unlocked.
            slot.last_used = tick;
            let existing = slot.handle.clone();
            drop(slots);
            debug!(project = %project, "discarding duplicate project store");
            return Ok(existing);
        }

        let mut evicted = None;
        if slots.entries.len() >= self.capacity {
            let oldest = slots
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                evicted = slots.entries.remove(&oldest).map(|slot| (oldest, slot));
            }
        }
        slots.entries.insert(
            project.clone(),
            Slot {
                handle: handle.clone(),
                last_used: tick,
            },
        );
        let open = slots.entries.len();
        drop(slots);

        if let Some((oldest, slot)) = evicted {
            drop(slot);
            debug!(project = %oldest, "evicted project store");
        }
        debug!(project = %project, open, "opened project store");
        Ok(handle)
    }

    fn lookup(&self, project: &ProjectId) -> Option<StoreHandle> {
        let mut slots = lock(&self.slots);
        slots.tick += 1;
        let tick = slots.tick;
        let slot = slots.entries.get_mut(project)?;
        slot.last_used = tick;
        Some(slot.handle.clone())
    }

    /// Drop the cache's reference to a project. Returns whether it was cached.
    pub fn close(&self, project: &ProjectId) -> bool {
        let removed = lock(&self.slots).entries.remove(project);
        removed.is_some()
    }

    pub fn close_all(&self) {
        let drained: Vec<Slot> = lock(&self.slots).entries.drain().map(|(_, s)| s).collect();
        debug!(count = drained.len(), "closing all project stores");
    }
}
