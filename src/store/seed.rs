//! Built-in phase templates and workflows.
//!
//! Seeding writes straight to the store; the definition service refuses to
//! modify anything marked built-in afterwards.

use tracing::info;

use crate::store::Store;
use crate::workflow::{GateType, PhaseTemplate, PromptSource, Workflow, WorkflowPhase};
use crate::Result;

struct TemplateSpec {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    prompt: &'static str,
    produces_artifact: bool,
    max_iterations: u32,
    gate: GateType,
    retry_from: Option<&'static str>,
}

const TEMPLATES: &[TemplateSpec] = &[
    TemplateSpec {
        id: "tiny_spec",
        name: "Tiny Spec",
        description: "Short specification with acceptance criteria",
        prompt: "Write a brief specification for: {{TASK_TITLE}}\n\n{{TASK_DESCRIPTION}}",
        produces_artifact: true,
        max_iterations: 2,
        gate: GateType::Auto,
        retry_from: None,
    },
    TemplateSpec {
        id: "spec",
        name: "Specification",
        description: "Full specification with success criteria and testing plan",
        prompt: "Write a specification for: {{TASK_TITLE}}\n\n{{TASK_DESCRIPTION}}",
        produces_artifact: true,
        max_iterations: 3,
        gate: GateType::Auto,
        retry_from: None,
    },
    TemplateSpec {
        id: "breakdown",
        name: "Breakdown",
        description: "Split the specification into ordered implementation steps",
        prompt: "Break the specification into ordered steps.\n\n{{PRIOR_OUTPUTS}}",
        produces_artifact: true,
        max_iterations: 2,
        gate: GateType::Auto,
        retry_from: None,
    },
    TemplateSpec {
        id: "implement",
        name: "Implement",
        description: "Implement the change and its tests",
        prompt: "Implement: {{TASK_TITLE}}\n\n{{PRIOR_OUTPUTS}}\n\n{{RETRY_CONTEXT}}",
        produces_artifact: false,
        max_iterations: 5,
        gate: GateType::Auto,
        retry_from: None,
    },
    TemplateSpec {
        id: "test",
        name: "Test",
        description: "Run the test suite and report failures",
        prompt: "Run the tests for: {{TASK_TITLE}}",
        produces_artifact: false,
        max_iterations: 3,
        gate: GateType::Auto,
        retry_from: Some("implement"),
    },
    TemplateSpec {
        id: "review",
        name: "Review",
        description: "Review the implementation against the specification",
        prompt: "Review the implementation of: {{TASK_TITLE}}\n\n{{PRIOR_OUTPUTS}}",
        produces_artifact: false,
        max_iterations: 3,
        gate: GateType::Auto,
        retry_from: Some("implement"),
    },
    TemplateSpec {
        id: "docs",
        name: "Documentation",
        description: "Update documentation for the change",
        prompt: "Update documentation for: {{TASK_TITLE}}",
        produces_artifact: true,
        max_iterations: 2,
        gate: GateType::Auto,
        retry_from: None,
    },
];

const WORKFLOWS: &[(&str, &str, &[&str])] = &[
    ("implement-trivial", "Trivial", &["implement"]),
    ("implement-small", "Small", &["tiny_spec", "implement", "review"]),
    ("implement-medium", "Medium", &["spec", "implement", "test", "review", "docs"]),
    (
        "implement-large",
        "Large",
        &["spec", "breakdown", "implement", "test", "review", "docs"],
    ),
];

pub fn builtin_templates() -> Vec<PhaseTemplate> {
    TEMPLATES
        .iter()
        .map(|spec| {
            let mut template = PhaseTemplate::new(spec.id, spec.name)
                .with_prompt(spec.prompt)
                .with_gate(spec.gate)
                .with_max_iterations(spec.max_iterations);
            template.description = spec.description.to_string();
            template.prompt_source = PromptSource::Embedded;
            template.produces_artifact = spec.produces_artifact;
            template.retry_from_phase = spec.retry_from.map(str::to_string);
            template.is_builtin = true;
            template
        })
        .collect()
}

/// Built-in workflows as linear chains of the built-in templates.
pub fn builtin_workflows() -> Vec<(Workflow, Vec<WorkflowPhase>)> {
    WORKFLOWS
        .iter()
        .map(|(id, name, chain)| {
            let mut workflow = Workflow::new(*id, name);
            workflow.is_builtin = true;
            let phases = chain
                .iter()
                .enumerate()
                .map(|(i, phase_id)| {
                    let phase = WorkflowPhase::new(phase_id, i as u32 + 1);
                    match i.checked_sub(1).and_then(|prev| chain.get(prev)) {
                        Some(prev) => phase.depends_on(&[*prev]),
                        None => phase,
                    }
                })
                .collect();
            (workflow, phases)
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub templates: usize,
    pub workflows: usize,
}

/// Write every built-in definition that is missing from the store.
pub fn seed(store: &dyn Store) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    for template in builtin_templates() {
        if store.get_phase_template(&template.id)?.is_none() {
            store.save_phase_template(&template)?;
            summary.templates += 1;
        }
    }
    for (workflow, phases) in builtin_workflows() {
        if store.load_workflow(&workflow.id)?.is_none() {
            store.save_workflow(&workflow)?;
            store.save_workflow_phases(&workflow.id, &phases)?;
            summary.workflows += 1;
        }
    }
    info!(
        templates = summary.templates,
        workflows = summary.workflows,
        "seeded built-in definitions"
    );
    Ok(summary)
}
