//! Workflow definitions and phase graph validation.
//!
//! A workflow is an ordered list of phases, each placing a phase template
//! into a dependency graph with optional loop-back and per-phase overrides.

mod types;
pub mod validate;

pub use types::{
    GateType, LoopConfig, PhaseTemplate, PromptSource, Workflow, WorkflowId, WorkflowPhase,
    WorkflowType,
};
pub use validate::{validate_phases, Severity, ValidationIssue, ValidationReport};
