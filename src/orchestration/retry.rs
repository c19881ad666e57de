//! Retry policy: where a failed phase sends execution back to, and how many
//! times it may do so.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::execution::RetryContext;
use crate::core::task::TaskId;
use crate::Result;

pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Failure output beyond this many characters is truncated in prompts.
const MAX_FAILURE_OUTPUT: usize = 4000;

pub fn default_retry_map() -> BTreeMap<String, String> {
    [
        ("test", "implement"),
        ("test_unit", "implement"),
        ("test_e2e", "implement"),
        ("review", "implement"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Failed phase → phase to re-enter.
    #[serde(default = "default_retry_map")]
    pub retry_map: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_map: default_retry_map(),
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Retry target for a failed phase, if retries are enabled.
    pub fn should_retry_from(&self, phase: &str) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.retry_map.get(phase).map(String::as_str)
    }

    /// The retry map as the planner consumes it: empty when disabled.
    pub fn effective_map(&self) -> BTreeMap<String, String> {
        if self.enabled {
            self.retry_map.clone()
        } else {
            BTreeMap::new()
        }
    }
}

/// Counts failures per phase within one run.
#[derive(Debug, Default)]
pub struct RetryTracker {
    counts: HashMap<String, u32>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure of `phase` and return the new count.
    pub fn record_failure(&mut self, phase: &str) -> u32 {
        let count = self.counts.entry(phase.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn failures(&self, phase: &str) -> u32 {
        self.counts.get(phase).copied().unwrap_or(0)
    }

    /// Whether `phase` may be attempted again given its iteration limit.
    pub fn can_retry(&self, phase: &str, max_iterations: u32) -> bool {
        self.failures(phase) < max_iterations
    }
}

/// Prompt section explaining why a phase is being re-entered.
pub fn build_retry_prompt(ctx: &RetryContext) -> String {
    let output = ctx.failure_output.as_deref().unwrap_or("(no output captured)");
    let output = truncate(output, MAX_FAILURE_OUTPUT);
    let mut prompt = format!(
        "## Retry Context\n\n\
         This phase is being re-executed after phase \"{}\" failed.\n\n\
         - Reason: {}\n\
         - Attempt: #{}\n\n\
         Failure output:\n\n---\n{}\n---\n\n\
         Fix the root cause of these issues in this phase.\n",
        ctx.from_phase, ctx.reason, ctx.attempt, output
    );
    if let Some(file) = &ctx.context_file {
        prompt.push_str(&format!("\nDetailed context saved to: {}\n", file));
    }
    prompt
}

/// Write the untruncated failure record to
/// `dir/<task>/retry-context-<from>-<attempt>.md` and return its path.
pub fn write_retry_context_file(dir: &Path, task: &TaskId, ctx: &RetryContext) -> Result<PathBuf> {
    let dir = dir.join(task.as_str());
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("retry-context-{}-{}.md", ctx.from_phase, ctx.attempt));
    let content = format!(
        "# Retry Context\n\n\
         ## Summary\n\
         - **From Phase**: {}\n\
         - **To Phase**: {}\n\
         - **Attempt**: {}\n\
         - **Timestamp**: {}\n\n\
         ## Reason\n{}\n\n\
         ## Output from Failed Phase\n\n{}\n",
        ctx.from_phase,
        ctx.to_phase,
        ctx.attempt,
        ctx.timestamp.to_rfc3339(),
        ctx.reason,
        ctx.failure_output.as_deref().unwrap_or("(no output captured)"),
    );
    std::fs::write(&path, content)?;
    Ok(path)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max).collect();
    format!("{}\n... (truncated)", head)
}
