//! Post-run reconciliation.
//!
//! Whatever way a run exits, the task must not be left claiming to be
//! running and subscribers must see its final execution snapshot. The
//! reconciler starts from the run's last in-memory copy of the task (the
//! store may have missed the final write), repairs a stale `running` status
//! and publishes the result even when the store cannot be written.

use tracing::{debug, error, warn};

use crate::core::execution::PhaseStatus;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::events::{Event, EventKind, EventSink};
use crate::store::Store;
use crate::Error;

/// Repair and announce the final state of a task after its run exited.
///
/// `snapshot` is the run's last in-memory copy of the task and wins over
/// the stored one. Returns `None` if the task no longer exists.
pub fn reconcile(
    store: &dyn Store,
    events: &dyn EventSink,
    task_id: &TaskId,
    snapshot: Option<Task>,
) -> Option<Task> {
    let stored = match store.load_task(task_id) {
        Ok(Some(task)) => Some(task),
        Ok(None) => {
            warn!(task = %task_id, "task vanished before reconciliation");
            return None;
        }
        Err(e) => {
            warn!(task = %task_id, "could not reload task for reconciliation: {}", e);
            None
        }
    };
    let stored_status = stored.as_ref().map(|t| t.status);
    let mut task = snapshot.or(stored)?;

    let repaired = repair(&mut task);
    if repaired || stored_status != Some(task.status) {
        if let Err(e) = store.save_task(&task) {
            error!(task = %task_id, status = %task.status, "could not persist reconciled task: {}", e);
        }
    }
    if repaired {
        events.publish(Event::task(
            task_id,
            EventKind::TaskUpdated {
                status: task.status,
                current_phase: task.current_phase.clone(),
            },
        ));
    } else {
        debug!(task = %task_id, status = %task.status, "task consistent after run");
    }

    events.publish(Event::task(
        task_id,
        EventKind::State {
            status: task.status,
            execution: Box::new(task.execution.clone()),
        },
    ));
    Some(task)
}

/// Move a task still marked running to `paused` (its current phase was
/// interrupted) or `failed`. Returns whether anything changed.
fn repair(task: &mut Task) -> bool {
    if task.status != TaskStatus::Running {
        return false;
    }
    let interrupted = task
        .current_phase
        .as_deref()
        .map(|p| task.execution.phase_status(p) == PhaseStatus::Interrupted)
        .unwrap_or(false);
    let target = if interrupted {
        TaskStatus::Paused
    } else {
        TaskStatus::Failed
    };

    let err = Error::InconsistentState {
        task: task.id.clone(),
        detail: format!("run exited while task was running, marking {}", target),
    };
    warn!(task = %task.id, phase = ?task.current_phase, "{}", err);

    if target == TaskStatus::Failed && task.execution.error.is_none() {
        task.execution.error = Some(err.to_string());
    }
    if let Err(e) = task.set_status(target) {
        warn!(task = %task.id, "{}", e);
        task.status = target;
    }
    task.executor = None;
    true
}
