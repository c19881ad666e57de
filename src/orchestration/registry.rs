//! Registry of task runs in progress.
//!
//! A task id can be registered at most once. Registration hands back a
//! [`RunGuard`] that removes the entry when dropped, so the slot is freed on
//! every exit path of a run, including panics and cancelled futures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::core::task::TaskId;
use crate::util::lock;
use crate::{Error, Result};

struct RunEntry {
    run_id: Uuid,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub task_id: TaskId,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

#[derive(Default, Clone)]
pub struct RunningTasks {
    runs: Arc<Mutex<HashMap<TaskId, RunEntry>>>,
}

impl RunningTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run for `task_id`, failing with `AlreadyRunning` if one is
    /// already registered. Check and insert happen under one lock.
    pub fn try_register(&self, task_id: &TaskId, cancel: CancellationToken) -> Result<RunGuard> {
        let mut runs = lock(&self.runs);
        if runs.contains_key(task_id) {
            return Err(Error::AlreadyRunning(task_id.clone()));
        }
        let run_id = Uuid::new_v4();
        runs.insert(
            task_id.clone(),
            RunEntry {
                run_id,
                cancel,
                started_at: Utc::now(),
            },
        );
        debug!(task = %task_id, run = %run_id, "registered run");
        Ok(RunGuard {
            runs: self.runs.clone(),
            task_id: task_id.clone(),
            run_id,
        })
    }

    /// Fire the cancellation token of a running task.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        match lock(&self.runs).get(task_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, task_id: &TaskId) -> bool {
        lock(&self.runs).contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        lock(&self.runs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn running(&self) -> Vec<RunInfo> {
        let mut runs: Vec<RunInfo> = lock(&self.runs)
            .iter()
            .map(|(task_id, entry)| RunInfo {
                task_id: task_id.clone(),
                run_id: entry.run_id,
                started_at: entry.started_at,
            })
            .collect();
        runs.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        runs
    }

    /// Cancel every registered run.
    pub fn cancel_all(&self) -> usize {
        let runs = lock(&self.runs);
        for entry in runs.values() {
            entry.cancel.cancel();
        }
        runs.len()
    }
}

/// Removes its registry entry on drop.
pub struct RunGuard {
    runs: Arc<Mutex<HashMap<TaskId, RunEntry>>>,
    task_id: TaskId,
    run_id: Uuid,
}

impl RunGuard {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut runs = lock(&self.runs);
        // Only remove our own registration.
        if runs.get(&self.task_id).map(|e| e.run_id) == Some(self.run_id) {
            runs.remove(&self.task_id);
            debug!(task = %self.task_id, run = %self.run_id, "released run");
        }
    }
}

impl std::fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunGuard")
            .field("task_id", &self.task_id)
            .field("run_id", &self.run_id)
            .finish()
    }
}
