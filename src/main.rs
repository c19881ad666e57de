use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use orc::config::Config;
use orc::core::task::TaskId;
use orc::orchestration::{plan_resume, OrphanDetector};
use orc::store::{seed, DefinitionService, JsonFileStore, Store};
use orc::workflow::{Severity, WorkflowId};
use orc::Result;

/// orc - multi-phase task orchestrator
#[derive(Parser, Debug)]
#[command(name = "orc")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    ORC_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.orc/orc.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Project directory holding the .orc store
    #[arg(short = 'p', long, default_value = ".")]
    pub project: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Write the built-in phase templates and workflows into the project
    Seed,

    /// Check a workflow's phase graph for dangling dependencies and cycles
    Validate {
        /// Workflow ID to validate
        workflow: String,
    },

    /// List tasks with their status and current phase
    Tasks,

    /// Show the phase a task would resume from
    ResumePoint {
        /// Task ID
        task: String,
    },

    /// Report running tasks whose executor process is gone
    Orphans,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = orc::log::init_with_debug(cli.debug);
    let config = Config::load()?;
    let store = Arc::new(JsonFileStore::open(&cli.project)?);

    match cli.command {
        Command::Seed => run_seed(store.as_ref()),
        Command::Validate { workflow } => run_validate(store, &WorkflowId::from(workflow)),
        Command::Tasks => run_tasks(store.as_ref()),
        Command::ResumePoint { task } => {
            run_resume_point(store.as_ref(), &config, &TaskId::from(task))
        }
        Command::Orphans => run_orphans(store.as_ref()),
    }
}

fn run_seed(store: &dyn Store) -> Result<()> {
    let summary = seed::seed(store)?;
    println!(
        "Seeded {} phase template(s) and {} workflow(s)",
        summary.templates, summary.workflows
    );
    Ok(())
}

fn run_validate(store: Arc<JsonFileStore>, workflow: &WorkflowId) -> Result<()> {
    let definitions = DefinitionService::new(store);
    definitions.get_workflow(workflow)?;
    let report = definitions.validate_workflow(workflow)?;
    if report.issues.is_empty() {
        println!("{}: valid", workflow);
        return Ok(());
    }
    for issue in &report.issues {
        let label = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        println!("{}: {}", label, issue.message);
    }
    if report.valid {
        println!("{}: valid with {} warning(s)", workflow, report.warnings().count());
        Ok(())
    } else {
        report.into_result(workflow)
    }
}

fn run_tasks(store: &dyn Store) -> Result<()> {
    let tasks = store.list_tasks()?;
    if tasks.is_empty() {
        println!("No tasks");
        return Ok(());
    }
    for task in tasks {
        println!(
            "{:<14} {:<11} {:<12} {}",
            task.id,
            task.status,
            task.current_phase.as_deref().unwrap_or("-"),
            task.title
        );
    }
    Ok(())
}

fn run_resume_point(store: &dyn Store, config: &Config, task_id: &TaskId) -> Result<()> {
    let task = store
        .load_task(task_id)?
        .ok_or_else(|| orc::Error::TaskNotFound(task_id.clone()))?;
    let phase = plan_resume(&task, &config.retry_policy().effective_map())?;
    println!("{}", phase);
    Ok(())
}

fn run_orphans(store: &dyn Store) -> Result<()> {
    let tasks = store.list_tasks()?;
    let detector = OrphanDetector::default();
    let orphans = detector.scan(&tasks);
    if orphans.is_empty() {
        println!("No orphaned tasks");
        return Ok(());
    }
    for (task, reason) in orphans {
        println!("{:<14} {}", task.id, reason);
    }
    Ok(())
}
