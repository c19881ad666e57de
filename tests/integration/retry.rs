//! Failure handling: self retries, cross-phase retries, exhaustion.

use tokio_util::sync::CancellationToken;

use orc::core::execution::{PhaseStatus, ValidationDecision};
use orc::core::task::TaskStatus;
use orc::events::EventKind;
use orc::orchestration::{ExecutorConfig, RetryPolicy};
use orc::workflow::{PhaseTemplate, WorkflowPhase};

use crate::fixtures::{linear, task_events, Harness, Script};

fn fail(message: &str) -> Script {
    Script::Fail(message.to_string())
}

/// Test: A phase that keeps failing exhausts its iterations
/// Given implement always fails and allows 3 iterations
/// When the task is run
/// Then implement runs exactly 3 times and the task fails
#[tokio::test]
async fn test_exhausted_iterations_fail_task() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    let mut sub = h.subscribe();
    h.runner.always("implement", fail("compile error"));

    let status = h
        .executor()
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Failed);
    assert_eq!(h.runner.count("implement"), 3);
    assert_eq!(h.runner.count("review"), 0);

    let task = h.load(&task_id);
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        task.execution.error.as_deref(),
        Some("phase implement failed after 3 attempt(s): compile error")
    );
    let implement = task.execution.phase("implement").unwrap();
    assert_eq!(implement.status, PhaseStatus::Failed);
    assert_eq!(implement.iterations, 3);

    let kinds = task_events(sub.drain(), &task_id);
    let retries: Vec<bool> = kinds
        .iter()
        .filter_map(|k| match k {
            EventKind::PhaseFailed { will_retry, .. } => Some(*will_retry),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![true, true, false]);
    assert!(kinds
        .iter()
        .any(|k| matches!(k, EventKind::Error { phase: Some(p), .. } if p == "implement")));
}

/// Test: Review failure sends execution back to implement
/// Given review fails once
/// When the task is run
/// Then implement reruns with the retry context and the task completes
#[tokio::test]
async fn test_cross_phase_retry_via_retry_map() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    h.runner.push("review", fail("missing error handling"));

    let status = h
        .executor()
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(
        h.runner.phases_called(),
        vec!["spec", "implement", "review", "implement", "review"]
    );

    let calls = h.runner.calls();
    assert!(calls[1].retry_context.is_none());
    let retried = calls[3].retry_context.as_deref().unwrap();
    assert!(retried.contains("missing error handling"));
    assert!(calls[4].retry_context.is_none());

    let task = h.load(&task_id);
    assert!(task.execution.retry_context.is_none());
    assert!(task.execution.error.is_none());
    let review = task.execution.phase("review").unwrap();
    assert_eq!(review.iterations, 2);
    assert_eq!(review.validation_history.len(), 1);
    assert_eq!(
        review.validation_history[0].decision,
        ValidationDecision::Retry
    );
    assert_eq!(task.execution.phase("spec").unwrap().iterations, 1);
}

/// Test: Cross-phase retries also spend the failing phase's iterations
#[tokio::test]
async fn test_cross_phase_retry_exhausts_review() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    h.runner.always("review", fail("still wrong"));

    let status = h
        .executor()
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Failed);
    assert_eq!(
        h.runner.phases_called(),
        vec!["spec", "implement", "review", "implement", "review", "implement", "review"]
    );
}

/// Test: Disabled retry policy retries the phase in place
#[tokio::test]
async fn test_disabled_policy_retries_in_place() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    h.runner.push("review", fail("flaky"));

    let status = h
        .executor_with(ExecutorConfig {
            retry: RetryPolicy::disabled(),
            ..ExecutorConfig::default()
        })
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(
        h.runner.phases_called(),
        vec!["spec", "implement", "review", "review"]
    );
}

/// Test: Cross-phase retry budget of zero fails on the first failure
#[tokio::test]
async fn test_zero_retry_budget_refuses_cross_phase() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    h.runner.push("review", fail("nope"));

    let status = h
        .executor_with(ExecutorConfig {
            retry: RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            },
            ..ExecutorConfig::default()
        })
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Failed);
    assert_eq!(
        h.runner.phases_called(),
        vec!["spec", "implement", "review"]
    );
}

/// Test: Template retry target takes precedence over the map
#[tokio::test]
async fn test_template_retry_from_overrides_map() {
    let h = Harness::new();
    h.template(PhaseTemplate::new("review", "Review").with_retry_from("spec"));
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    h.runner.push("review", fail("wrong requirements"));

    let status = h
        .executor()
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(
        h.runner.phases_called(),
        vec!["spec", "implement", "review", "spec", "implement", "review"]
    );
}

/// Test: Loop configuration supplies the target for unmapped phases
#[tokio::test]
async fn test_loop_config_target() {
    let h = Harness::new();
    let wf = h.workflow(
        "wf",
        vec![
            WorkflowPhase::new("spec", 1),
            WorkflowPhase::new("implement", 2).depends_on(&["spec"]),
            WorkflowPhase::new("check", 3)
                .depends_on(&["implement"])
                .with_loop("spec", 3),
        ],
    );
    let task_id = h.task("TASK-001");
    h.runner.push("check", fail("drift"));

    let status = h
        .executor()
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(
        h.runner.phases_called(),
        vec!["spec", "implement", "check", "spec", "implement", "check"]
    );
}

/// Test: Full failure output is saved beside the retry prompt
/// Given a retry context directory is configured and review fails once
/// When implement is re-entered
/// Then its retry context names the saved file holding the review output
#[tokio::test]
async fn test_retry_context_file_written() {
    let dir = tempfile::TempDir::new().unwrap();
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    h.runner.push("review", fail("login() has no error path"));

    let status = h
        .executor_with(ExecutorConfig {
            retry_context_dir: Some(dir.path().to_path_buf()),
            ..ExecutorConfig::default()
        })
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);

    let file = dir.path().join("TASK-001").join("retry-context-review-1.md");
    let saved = std::fs::read_to_string(&file).unwrap();
    assert!(saved.contains("login() has no error path"));

    let calls = h.runner.calls();
    let retried = calls[3].retry_context.as_deref().unwrap();
    assert!(retried.contains(&file.display().to_string()));
}
