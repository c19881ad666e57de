//! Workflow and phase template definitions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a workflow definition, e.g. `implement-medium`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkflowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkflowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkflowId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// What a workflow operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    #[default]
    Task,
    Branch,
    Standalone,
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowType::Task => write!(f, "task"),
            WorkflowType::Branch => write!(f, "branch"),
            WorkflowType::Standalone => write!(f, "standalone"),
        }
    }
}

/// How a phase transition is approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GateType {
    /// Evaluated inline by the scheduler.
    #[default]
    Auto,
    /// Waits for an external decision.
    Human,
    /// Bypassed; the phase is marked skipped.
    Skip,
}

impl std::fmt::Display for GateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateType::Auto => write!(f, "auto"),
            GateType::Human => write!(f, "human"),
            GateType::Skip => write!(f, "skip"),
        }
    }
}

impl std::str::FromStr for GateType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(GateType::Auto),
            "human" => Ok(GateType::Human),
            "skip" => Ok(GateType::Skip),
            other => Err(format!("unknown gate type: {}", other)),
        }
    }
}

/// Where a phase template's prompt comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    /// Compiled into the binary (built-in templates).
    #[default]
    Embedded,
    /// Stored alongside the template definition.
    Stored,
    /// Read from `prompt_path` at run time.
    File,
}

impl std::fmt::Display for PromptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptSource::Embedded => write!(f, "embedded"),
            PromptSource::Stored => write!(f, "stored"),
            PromptSource::File => write!(f, "file"),
        }
    }
}

/// A reusable phase definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt_source: PromptSource,
    pub prompt_content: Option<String>,
    pub prompt_path: Option<String>,
    #[serde(default)]
    pub produces_artifact: bool,
    pub artifact_type: Option<String>,
    pub max_iterations: u32,
    #[serde(default)]
    pub thinking_enabled: bool,
    #[serde(default)]
    pub gate_type: GateType,
    #[serde(default)]
    pub checkpoint: bool,
    /// Phase to re-enter when this phase fails.
    pub retry_from_phase: Option<String>,
    #[serde(default)]
    pub is_builtin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PhaseTemplate {
    pub fn new(id: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            prompt_source: PromptSource::Stored,
            prompt_content: None,
            prompt_path: None,
            produces_artifact: false,
            artifact_type: None,
            max_iterations: 3,
            thinking_enabled: false,
            gate_type: GateType::Auto,
            checkpoint: false,
            retry_from_phase: None,
            is_builtin: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt_content = Some(prompt.to_string());
        self
    }

    pub fn with_gate(mut self, gate: GateType) -> Self {
        self.gate_type = gate;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_retry_from(mut self, phase: &str) -> Self {
        self.retry_from_phase = Some(phase.to_string());
        self
    }
}

/// Loop-back configuration: return to an earlier phase after this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub loop_to_phase: String,
    pub max_iterations: u32,
}

/// A phase template placed into a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPhase {
    pub phase_template_id: String,
    pub sequence: u32,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    pub loop_config: Option<LoopConfig>,
    pub max_iterations_override: Option<u32>,
    pub model_override: Option<String>,
    pub thinking_override: Option<bool>,
    pub gate_type_override: Option<GateType>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
}

impl WorkflowPhase {
    pub fn new(phase_template_id: &str, sequence: u32) -> Self {
        Self {
            phase_template_id: phase_template_id.to_string(),
            sequence,
            depends_on: BTreeSet::new(),
            loop_config: None,
            max_iterations_override: None,
            model_override: None,
            thinking_override: None,
            gate_type_override: None,
            position_x: None,
            position_y: None,
        }
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on.extend(ids.iter().map(|id| id.to_string()));
        self
    }

    pub fn with_loop(mut self, loop_to_phase: &str, max_iterations: u32) -> Self {
        self.loop_config = Some(LoopConfig {
            loop_to_phase: loop_to_phase.to_string(),
            max_iterations,
        });
        self
    }

    pub fn with_gate(mut self, gate: GateType) -> Self {
        self.gate_type_override = Some(gate);
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations_override = Some(max);
        self
    }

    pub fn id(&self) -> &str {
        &self.phase_template_id
    }

    pub fn effective_gate(&self, template: &PhaseTemplate) -> GateType {
        self.gate_type_override.unwrap_or(template.gate_type)
    }

    pub fn effective_max_iterations(&self, template: &PhaseTemplate) -> u32 {
        self.max_iterations_override
            .unwrap_or(template.max_iterations)
            .max(1)
    }

    pub fn effective_model(&self, workflow: &Workflow) -> Option<String> {
        self.model_override
            .clone()
            .or_else(|| workflow.default_model.clone())
    }

    pub fn effective_thinking(&self, template: &PhaseTemplate, workflow: &Workflow) -> bool {
        self.thinking_override
            .unwrap_or(template.thinking_enabled || workflow.default_thinking)
    }
}

/// A workflow definition. Its phases are stored separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub workflow_type: WorkflowType,
    pub default_model: Option<String>,
    #[serde(default)]
    pub default_thinking: bool,
    #[serde(default)]
    pub is_builtin: bool,
    /// Workflow this one was cloned from.
    pub based_on: Option<WorkflowId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(id: impl Into<WorkflowId>, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.to_string(),
            description: String::new(),
            workflow_type: WorkflowType::Task,
            default_model: None,
            default_thinking: false,
            is_builtin: false,
            based_on: None,
            created_at: now,
            updated_at: now,
        }
    }
}
