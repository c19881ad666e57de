//! Execution state embedded in a task.
//!
//! Tracks per-phase progress, gate decisions, token and cost totals, the
//! retry context carried into a re-entered phase, and the agent session.
//! Only the scheduler owning a task's run mutates this; everyone else works
//! on clones.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::GateType;

/// Status of a single phase within a task's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
    Interrupted,
    Skipped,
    Blocked,
}

impl PhaseStatus {
    /// Completed or skipped: downstream phases may proceed.
    pub fn is_done(self) -> bool {
        matches!(self, PhaseStatus::Completed | PhaseStatus::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Running => "running",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Paused => "paused",
            PhaseStatus::Interrupted => "interrupted",
            PhaseStatus::Skipped => "skipped",
            PhaseStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token counts reported by the phase runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
    /// Input plus output.
    pub total: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
            ..Self::default()
        }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input += other.input;
        self.output += other.output;
        self.cache_creation += other.cache_creation;
        self.cache_read += other.cache_read;
        self.total = self.input + self.output;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CostTracking {
    pub total_usd: f64,
    #[serde(default)]
    pub phase_costs: BTreeMap<String, f64>,
}

/// Outcome recorded after a validation pass over a phase's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationDecision {
    Continue,
    Retry,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationEntry {
    pub iteration: u32,
    pub decision: ValidationDecision,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Progress of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PhaseState {
    pub status: PhaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub interrupted_at: Option<DateTime<Utc>>,
    pub iterations: u32,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub tokens: TokenUsage,
    pub commit: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub validation_history: Vec<ValidationEntry>,
    pub session_id: Option<String>,
}

/// An approval decision taken at a phase gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub phase: String,
    pub gate_type: GateType,
    pub approved: bool,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Why execution jumped back to an earlier phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryContext {
    pub from_phase: String,
    pub to_phase: String,
    pub reason: String,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub failure_output: Option<String>,
    /// File holding the full failure record, when one was written.
    #[serde(default)]
    pub context_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub model: String,
    pub status: String,
    pub turn_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExecutionState {
    pub current_iteration: u32,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseState>,
    #[serde(default)]
    pub gates: Vec<GateDecision>,
    #[serde(default)]
    pub tokens: TokenUsage,
    #[serde(default)]
    pub cost: CostTracking,
    pub retry_context: Option<RetryContext>,
    pub session: Option<SessionInfo>,
    pub error: Option<String>,
}

impl ExecutionState {
    pub fn ensure_phase(&mut self, phase: &str) -> &mut PhaseState {
        self.phases.entry(phase.to_string()).or_default()
    }

    pub fn phase(&self, phase: &str) -> Option<&PhaseState> {
        self.phases.get(phase)
    }

    /// Status of a phase, `pending` when it has no record yet.
    pub fn phase_status(&self, phase: &str) -> PhaseStatus {
        self.phases
            .get(phase)
            .map(|p| p.status)
            .unwrap_or_default()
    }

    pub fn is_phase_done(&self, phase: &str) -> bool {
        self.phase_status(phase).is_done()
    }

    pub fn start_phase(&mut self, phase: &str) {
        let state = self.ensure_phase(phase);
        state.status = PhaseStatus::Running;
        state.started_at = Some(Utc::now());
        state.completed_at = None;
        state.interrupted_at = None;
        state.error = None;
        state.iterations += 1;
        self.current_iteration += 1;
    }

    pub fn complete_phase(&mut self, phase: &str, commit: Option<String>) {
        let state = self.ensure_phase(phase);
        state.status = PhaseStatus::Completed;
        state.completed_at = Some(Utc::now());
        state.error = None;
        if commit.is_some() {
            state.commit = commit;
        }
    }

    pub fn fail_phase(&mut self, phase: &str, error: &str) {
        let state = self.ensure_phase(phase);
        state.status = PhaseStatus::Failed;
        state.error = Some(error.to_string());
    }

    pub fn interrupt_phase(&mut self, phase: &str) {
        let state = self.ensure_phase(phase);
        state.status = PhaseStatus::Interrupted;
        state.interrupted_at = Some(Utc::now());
    }

    /// Mark a phase skipped; the reason is kept in the error slot.
    pub fn skip_phase(&mut self, phase: &str, reason: &str) {
        let state = self.ensure_phase(phase);
        state.status = PhaseStatus::Skipped;
        state.completed_at = Some(Utc::now());
        state.error = Some(format!("skipped: {}", reason));
    }

    pub fn block_phase(&mut self, phase: &str, reason: &str) {
        let state = self.ensure_phase(phase);
        state.status = PhaseStatus::Blocked;
        state.error = Some(reason.to_string());
    }

    /// Return a phase to pending, keeping its iteration count and history.
    pub fn reset_phase(&mut self, phase: &str) {
        let state = self.ensure_phase(phase);
        state.status = PhaseStatus::Pending;
        state.error = None;
        state.completed_at = None;
        state.interrupted_at = None;
        state.session_id = None;
    }

    /// Add tokens to the aggregate and to the given phase.
    pub fn add_tokens(&mut self, phase: &str, tokens: &TokenUsage) {
        self.tokens.add(tokens);
        self.ensure_phase(phase).tokens.add(tokens);
    }

    pub fn add_cost(&mut self, phase: &str, cost_usd: f64) {
        self.cost.total_usd += cost_usd;
        *self.cost.phase_costs.entry(phase.to_string()).or_insert(0.0) += cost_usd;
    }

    pub fn add_artifact(&mut self, phase: &str, artifact: &str) {
        if artifact.is_empty() {
            return;
        }
        self.ensure_phase(phase).artifacts.push(artifact.to_string());
    }

    pub fn record_gate_decision(
        &mut self,
        phase: &str,
        gate_type: GateType,
        approved: bool,
        reason: Option<String>,
    ) {
        self.gates.push(GateDecision {
            phase: phase.to_string(),
            gate_type,
            approved,
            reason,
            timestamp: Utc::now(),
        });
    }

    pub fn set_retry_context(
        &mut self,
        from_phase: &str,
        to_phase: &str,
        reason: &str,
        failure_output: Option<String>,
        attempt: u32,
    ) {
        self.retry_context = Some(RetryContext {
            from_phase: from_phase.to_string(),
            to_phase: to_phase.to_string(),
            reason: reason.to_string(),
            attempt,
            timestamp: Utc::now(),
            failure_output,
            context_file: None,
        });
    }

    pub fn set_retry_context_file(&mut self, path: &str) {
        if let Some(ctx) = self.retry_context.as_mut() {
            ctx.context_file = Some(path.to_string());
        }
    }

    pub fn clear_retry_context(&mut self) {
        self.retry_context = None;
    }

    pub fn set_session(&mut self, id: &str, model: &str, status: &str, turn_count: u32) {
        let now = Utc::now();
        match self.session.as_mut() {
            Some(session) => {
                session.id = id.to_string();
                session.model = model.to_string();
                session.status = status.to_string();
                session.turn_count = turn_count;
                session.last_activity = now;
            }
            None => {
                self.session = Some(SessionInfo {
                    id: id.to_string(),
                    model: model.to_string(),
                    status: status.to_string(),
                    turn_count,
                    created_at: now,
                    last_activity: now,
                });
            }
        }
    }

    pub fn record_validation(
        &mut self,
        phase: &str,
        decision: ValidationDecision,
        reason: &str,
    ) {
        let state = self.ensure_phase(phase);
        let iteration = state.iterations;
        state.validation_history.push(ValidationEntry {
            iteration,
            decision,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Phases currently `running` or `interrupted`, sorted by id.
    pub fn unfinished_phases(&self) -> Vec<&str> {
        self.phases
            .iter()
            .filter(|(_, state)| {
                matches!(state.status, PhaseStatus::Running | PhaseStatus::Interrupted)
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }
}
