//! Detection of tasks marked running whose executor has died.
//!
//! A running task records an [`ExecutorClaim`]. The claim is checked against
//! the live process table: a dead pid or a pid now owned by a different
//! process (start time mismatch) means nobody is driving the task any more.

use tracing::debug;

use crate::core::execution::PhaseStatus;
use crate::core::task::{local_hostname, ExecutorClaim, Task, TaskId, TaskStatus};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: u32,
    /// Start time in clock ticks since boot.
    pub start_time: Option<u64>,
}

/// Looks up live processes.
pub trait ProcessProbe: Send + Sync {
    /// `None` when no process with `pid` exists.
    fn identity(&self, pid: u32) -> Option<ProcessIdentity>;
}

/// Reads `/proc/<pid>/stat`. Reports every process as gone on platforms
/// without procfs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsProbe;

impl ProcfsProbe {
    /// Start time of the current process, for recording in a claim.
    pub fn own_start_time(&self) -> Option<u64> {
        self.identity(std::process::id()).and_then(|id| id.start_time)
    }
}

impl ProcessProbe for ProcfsProbe {
    fn identity(&self, pid: u32) -> Option<ProcessIdentity> {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
        Some(ProcessIdentity {
            pid,
            start_time: parse_start_time(&stat),
        })
    }
}

/// Field 22 of `/proc/<pid>/stat`. The command name (field 2) may contain
/// spaces and parentheses, so fields are counted from the last `)`.
fn parse_start_time(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    // `rest` starts at field 3 (state).
    rest.split_whitespace().nth(19)?.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanReason {
    NoExecutorRecorded,
    ProcessGone,
    PidReused,
}

impl std::fmt::Display for OrphanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrphanReason::NoExecutorRecorded => write!(f, "no executor recorded"),
            OrphanReason::ProcessGone => write!(f, "executor process is gone"),
            OrphanReason::PidReused => write!(f, "executor pid was reused by another process"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanStatus {
    /// Not running, so nothing to check.
    NotRunning,
    Alive,
    /// Claimed by another machine; cannot be probed from here.
    RemoteHost(String),
    Orphaned(OrphanReason),
}

impl OrphanStatus {
    pub fn is_orphaned(&self) -> bool {
        matches!(self, OrphanStatus::Orphaned(_))
    }
}

impl std::fmt::Display for OrphanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrphanStatus::NotRunning => write!(f, "task is not running"),
            OrphanStatus::Alive => write!(f, "executor is alive"),
            OrphanStatus::RemoteHost(host) => write!(f, "claimed by host {}", host),
            OrphanStatus::Orphaned(reason) => write!(f, "orphaned: {}", reason),
        }
    }
}

pub struct OrphanDetector<P: ProcessProbe = ProcfsProbe> {
    probe: P,
    hostname: String,
}

impl Default for OrphanDetector<ProcfsProbe> {
    fn default() -> Self {
        Self::new(ProcfsProbe)
    }
}

impl<P: ProcessProbe> OrphanDetector<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            hostname: local_hostname(),
        }
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = hostname.to_string();
        self
    }

    pub fn check(&self, task: &Task) -> OrphanStatus {
        if task.status != TaskStatus::Running {
            return OrphanStatus::NotRunning;
        }
        match &task.executor {
            None => OrphanStatus::Orphaned(OrphanReason::NoExecutorRecorded),
            Some(claim) => self.check_claim(&task.id, claim),
        }
    }

    fn check_claim(&self, task: &TaskId, claim: &ExecutorClaim) -> OrphanStatus {
        if claim.hostname != self.hostname {
            return OrphanStatus::RemoteHost(claim.hostname.clone());
        }
        let Some(live) = self.probe.identity(claim.pid) else {
            debug!(task = %task, pid = claim.pid, "executor process not found");
            return OrphanStatus::Orphaned(OrphanReason::ProcessGone);
        };
        match (claim.start_time, live.start_time) {
            (Some(recorded), Some(actual)) if recorded != actual => {
                debug!(task = %task, pid = claim.pid, recorded, actual, "executor pid reused");
                OrphanStatus::Orphaned(OrphanReason::PidReused)
            }
            _ => OrphanStatus::Alive,
        }
    }

    /// Orphaned tasks among `tasks`, with the reason for each.
    pub fn scan<'a>(&self, tasks: &'a [Task]) -> Vec<(&'a Task, OrphanReason)> {
        tasks
            .iter()
            .filter_map(|task| match self.check(task) {
                OrphanStatus::Orphaned(reason) => Some((task, reason)),
                _ => None,
            })
            .collect()
    }
}

/// Take an orphaned task back from its dead executor: the phase it was in
/// is marked interrupted and the task paused, ready to resume.
pub fn release_orphan(task: &mut Task) -> Result<()> {
    if let Some(phase) = task.current_phase.clone() {
        if task.execution.phase_status(&phase) == PhaseStatus::Running {
            task.execution.interrupt_phase(&phase);
        }
    }
    task.set_status(TaskStatus::Paused)?;
    task.executor = None;
    Ok(())
}
