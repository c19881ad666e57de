//! Resume point planning.
//!
//! Decides which phase the next run of a task enters, from the task's
//! persisted execution state alone.

use std::collections::BTreeMap;

use crate::core::dag::PhaseGraph;
use crate::core::execution::PhaseStatus;
use crate::core::task::{Task, TaskStatus};
use crate::{Error, Result};

/// Phase to resume a task from.
///
/// In priority order: a phase left running or interrupted (lowest id if
/// several); the retry context's target; the retry-map target of a failed
/// current phase; the current phase.
pub fn plan_resume(task: &Task, retry_map: &BTreeMap<String, String>) -> Result<String> {
    let exec = &task.execution;

    if let Some(phase) = exec.unfinished_phases().first() {
        return Ok(phase.to_string());
    }

    if let Some(ctx) = &exec.retry_context {
        if !ctx.to_phase.is_empty() {
            return Ok(ctx.to_phase.clone());
        }
    }

    let current = task
        .current_phase
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::NoResumePoint(task.id.clone()))?;

    let phase_failed = exec.phase(current).is_some_and(|state| {
        state.status == PhaseStatus::Failed
            || (state.error.is_some()
                && !matches!(state.status, PhaseStatus::Skipped | PhaseStatus::Blocked))
    });
    if task.status == TaskStatus::Failed || phase_failed {
        if let Some(target) = retry_map.get(current) {
            return Ok(target.clone());
        }
    }

    Ok(current.to_string())
}

/// Phase a run starts at. A task without progress starts at the first phase
/// of the graph; otherwise the resume point is used, falling back to the
/// first unfinished phase when it is unknown to the graph.
pub fn plan_start(
    task: &Task,
    graph: &PhaseGraph,
    retry_map: &BTreeMap<String, String>,
) -> Result<String> {
    let no_resume = || Error::NoResumePoint(task.id.clone());

    if !task.has_progress() {
        return graph
            .first_phase()
            .map(|p| p.id().to_string())
            .ok_or_else(no_resume);
    }

    match plan_resume(task, retry_map) {
        Ok(phase) if graph.contains(&phase) => Ok(phase),
        Ok(_) | Err(Error::NoResumePoint(_)) => graph
            .topological_order()
            .into_iter()
            .find(|p| !task.execution.is_phase_done(p.id()))
            .map(|p| p.id().to_string())
            .ok_or_else(no_resume),
        Err(e) => Err(e),
    }
}
