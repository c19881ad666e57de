//! Phase graph validation.
//!
//! Checks a workflow's phase list for dangling `depends_on` references,
//! dependency cycles and dangling loop-back targets. Pure and deterministic:
//! the same phase list always yields the same issues in the same order.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::workflow::{WorkflowId, WorkflowPhase};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    pub phase_ids: Vec<String>,
}

impl ValidationIssue {
    pub fn error(message: impl Into<String>, phase_ids: Vec<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            phase_ids,
        }
    }

    pub fn warning(message: impl Into<String>, phase_ids: Vec<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            phase_ids,
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// Turn a report with errors into `Error::Validation`.
    pub fn into_result(self, workflow: &WorkflowId) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::Validation {
                workflow: workflow.clone(),
                issues: self.issues,
            })
        }
    }
}

/// Validate the dependency graph formed by a workflow's phases.
pub fn validate_phases(phases: &[WorkflowPhase]) -> ValidationReport {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    let mut duplicates = BTreeSet::new();
    for phase in phases {
        if !seen.insert(phase.id()) {
            duplicates.insert(phase.id().to_string());
        }
    }
    for id in duplicates {
        issues.push(ValidationIssue::error(
            format!("phase \"{}\" appears more than once", id),
            vec![id],
        ));
    }

    for phase in phases {
        for dep in &phase.depends_on {
            if !seen.contains(dep.as_str()) {
                issues.push(ValidationIssue::error(
                    format!(
                        "phase \"{}\" depends on non-existent phase \"{}\"",
                        phase.id(),
                        dep
                    ),
                    vec![phase.id().to_string()],
                ));
            }
        }
    }

    let cyclic = find_cycle_members(phases, &seen);
    if !cyclic.is_empty() {
        issues.push(ValidationIssue::error(
            format!("cycle detected involving phases: {}", cyclic.join(", ")),
            cyclic,
        ));
    }

    for phase in phases {
        if let Some(loop_config) = &phase.loop_config {
            if !seen.contains(loop_config.loop_to_phase.as_str()) {
                issues.push(ValidationIssue::warning(
                    format!(
                        "phase \"{}\" has loop_to_phase referencing non-existent phase \"{}\"",
                        phase.id(),
                        loop_config.loop_to_phase
                    ),
                    vec![phase.id().to_string()],
                ));
            }
        }
    }

    let valid = !issues.iter().any(|i| i.severity == Severity::Error);
    ValidationReport { valid, issues }
}

/// Kahn's algorithm over `depends_on`; returns the sorted ids left with
/// unresolved dependencies. Dangling and duplicate edges are ignored.
fn find_cycle_members(phases: &[WorkflowPhase], known: &HashSet<&str>) -> Vec<String> {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for phase in phases {
        indegree.entry(phase.id()).or_insert(0);
    }
    let mut edges = HashSet::new();
    for phase in phases {
        for dep in &phase.depends_on {
            if !known.contains(dep.as_str()) || !edges.insert((dep.as_str(), phase.id())) {
                continue;
            }
            *indegree.entry(phase.id()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(phase.id());
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|&(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    while let Some(id) = queue.pop_front() {
        for &next in dependents.get(id).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    indegree
        .into_iter()
        .filter(|(_, d)| *d > 0)
        .map(|(id, _)| id.to_string())
        .collect()
}
