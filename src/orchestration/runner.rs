//! The phase runner seam.
//!
//! The scheduler never talks to an agent directly. It resolves a prompt,
//! hands a [`PhaseInput`] to a [`PhaseRunner`] and records whatever
//! [`PhaseOutput`] comes back.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::expand_tilde;
use crate::core::execution::TokenUsage;
use crate::core::task::{Task, TaskId};
use crate::workflow::{PhaseTemplate, PromptSource, WorkflowId};
use crate::{Error, Result};

/// Everything a runner needs to execute one phase iteration.
#[derive(Debug, Clone)]
pub struct PhaseInput {
    pub task_id: TaskId,
    pub workflow_id: WorkflowId,
    pub phase: String,
    pub template: PhaseTemplate,
    pub model: Option<String>,
    pub thinking: bool,
    /// 1-based attempt number of this phase.
    pub iteration: u32,
    pub prompt: String,
    /// Output of every phase completed so far in this run, by phase id.
    pub prior_outputs: BTreeMap<String, String>,
    pub retry_context: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PhaseOutput {
    pub content: String,
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub commit: Option<String>,
    pub artifacts: Vec<String>,
    pub session_id: Option<String>,
}

impl PhaseOutput {
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Self::default()
        }
    }
}

/// Executes a single phase. Implementations should return promptly once
/// `cancel` fires; the scheduler also stops waiting on its own.
#[async_trait]
pub trait PhaseRunner: Send + Sync {
    async fn run(&self, input: PhaseInput, cancel: CancellationToken) -> Result<PhaseOutput>;
}

/// Build the prompt for a phase from its template.
///
/// Placeholders `{{TASK_TITLE}}`, `{{TASK_DESCRIPTION}}`, `{{PRIOR_OUTPUTS}}`
/// and `{{RETRY_CONTEXT}}` are substituted. File prompts are read relative to
/// `base_dir` unless absolute.
pub fn resolve_prompt(
    template: &PhaseTemplate,
    task: &Task,
    prior_outputs: &BTreeMap<String, String>,
    retry_context: Option<&str>,
    base_dir: Option<&Path>,
) -> Result<String> {
    let raw = match template.prompt_source {
        PromptSource::Embedded | PromptSource::Stored => template
            .prompt_content
            .clone()
            .unwrap_or_else(|| format!("Execute the {} phase for: {{{{TASK_TITLE}}}}", template.name)),
        PromptSource::File => {
            let path = template.prompt_path.as_deref().ok_or_else(|| Error::PhaseRunner {
                phase: template.id.clone(),
                message: "prompt source is file but no prompt path is set".to_string(),
            })?;
            let path = expand_tilde(path);
            let path = match base_dir {
                Some(base) if path.is_relative() => base.join(path),
                _ => path,
            };
            std::fs::read_to_string(&path)?
        }
    };

    let prior = prior_outputs
        .iter()
        .map(|(phase, output)| format!("### {}\n\n{}", phase, output))
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(raw
        .replace("{{TASK_TITLE}}", &task.title)
        .replace("{{TASK_DESCRIPTION}}", &task.description)
        .replace("{{PRIOR_OUTPUTS}}", &prior)
        .replace("{{RETRY_CONTEXT}}", retry_context.unwrap_or("")))
}
