//! Full workflow runs.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use orc::core::execution::PhaseStatus;
use orc::core::task::TaskStatus;
use orc::events::{EventKind, SessionTracker};
use orc::workflow::WorkflowPhase;
use orc::Error;

use crate::fixtures::{linear, started_phases, task_events, Harness};

/// Test: Linear workflow runs to completion
/// Given spec -> implement -> review
/// When the task is run
/// Then every phase runs once in order and the task completes
#[tokio::test]
async fn test_linear_workflow_completes() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    let mut sub = h.subscribe();

    let status = h
        .executor()
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(h.runner.phases_called(), vec!["spec", "implement", "review"]);

    let task = h.load(&task_id);
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.completed_at.is_some());
    assert!(task.executor.is_none());
    assert_eq!(task.workflow_id, Some(wf));
    for phase in ["spec", "implement", "review"] {
        let state = task.execution.phase(phase).unwrap();
        assert_eq!(state.status, PhaseStatus::Completed);
        assert_eq!(state.iterations, 1);
        assert_eq!(state.commit.as_deref(), Some(format!("commit-{}", phase).as_str()));
        assert_eq!(state.artifacts, vec![format!("{}.md", phase)]);
    }
    assert_eq!(task.execution.tokens.total, 450);
    assert!((task.execution.cost.total_usd - 0.03).abs() < 1e-9);

    let kinds = task_events(sub.drain(), &task_id);
    assert_eq!(started_phases(&kinds), vec!["spec", "implement", "review"]);
    assert!(kinds.contains(&EventKind::Complete {
        status: TaskStatus::Completed
    }));
    assert!(matches!(
        kinds.last(),
        Some(EventKind::State {
            status: TaskStatus::Completed,
            ..
        })
    ));
}

/// Test: Runner input carries accumulated context
#[tokio::test]
async fn test_prior_outputs_and_prompt_passed_to_runner() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement"]));
    h.template(
        orc::workflow::PhaseTemplate::new("implement", "Implement")
            .with_prompt("Build {{TASK_TITLE}}\n{{PRIOR_OUTPUTS}}"),
    );
    let task_id = h.task("TASK-001");

    h.executor()
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();

    let calls = h.runner.calls();
    assert!(calls[0].prior_outputs.is_empty());
    assert_eq!(calls[0].iteration, 1);
    let implement = &calls[1];
    assert_eq!(
        implement.prior_outputs.get("spec").map(String::as_str),
        Some("spec output")
    );
    assert!(implement.prompt.starts_with("Build Task TASK-001"));
    assert!(implement.prompt.contains("spec output"));
    assert!(implement.retry_context.is_none());
}

/// Test: Diamond dependencies run in (sequence, id) order
#[tokio::test]
async fn test_diamond_runs_in_dependency_order() {
    let h = Harness::new();
    let wf = h.workflow(
        "diamond",
        vec![
            WorkflowPhase::new("spec", 1),
            WorkflowPhase::new("backend", 2).depends_on(&["spec"]),
            WorkflowPhase::new("api", 2).depends_on(&["spec"]),
            WorkflowPhase::new("review", 3).depends_on(&["api", "backend"]),
        ],
    );
    let task_id = h.task("TASK-001");

    h.executor()
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        h.runner.phases_called(),
        vec!["spec", "api", "backend", "review"]
    );
}

/// Test: Invalid workflow is rejected before any state change
#[tokio::test]
async fn test_cyclic_workflow_rejected_without_state_change() {
    let h = Harness::new();
    let wf = h.workflow(
        "cyclic",
        vec![
            WorkflowPhase::new("a", 1).depends_on(&["b"]),
            WorkflowPhase::new("b", 2).depends_on(&["a"]),
        ],
    );
    let task_id = h.task("TASK-001");
    let before = serde_json::to_value(h.load(&task_id)).unwrap();

    let err = h
        .executor()
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        Error::Validation { issues, .. } => {
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].phase_ids, vec!["a", "b"]);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(h.runner.calls().is_empty());
    assert_eq!(serde_json::to_value(h.load(&task_id)).unwrap(), before);
}

/// Test: Dangling dependency is a validation error
#[tokio::test]
async fn test_dangling_dependency_rejected() {
    let h = Harness::new();
    let wf = h.workflow(
        "dangling",
        vec![WorkflowPhase::new("implement", 1).depends_on(&["spec"])],
    );
    let task_id = h.task("TASK-001");
    let err = h
        .executor()
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

/// Test: Missing workflow and task
#[tokio::test]
async fn test_missing_workflow_and_task() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor();

    let err = executor
        .run(&task_id, &"nope".into(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WorkflowNotFound(_)));

    let err = executor
        .run(&"TASK-404".into(), &wf, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));
    assert!(executor.registry().is_empty());
}

/// Test: A completed task is not runnable until re-planned
#[tokio::test]
async fn test_completed_task_not_runnable() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor();
    executor
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();

    let err = executor
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::TaskNotRunnable {
            status: TaskStatus::Completed,
            ..
        }
    ));
    assert_eq!(h.runner.count("spec"), 1);
}

/// Test: Session usage is published to wildcard subscribers
#[tokio::test]
async fn test_session_updates_published() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement"]));
    let task_id = h.task("TASK-001");
    let session = Arc::new(SessionTracker::new());
    let mut sub = h.subscribe();

    h.executor()
        .with_session(session.clone())
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();

    let updates: Vec<_> = sub
        .drain()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::SessionUpdate(summary) => Some(summary),
            _ => None,
        })
        .collect();
    // Summary on subscribe, then one per completed phase and one at exit.
    assert_eq!(updates.len(), 4);
    assert_eq!(updates[0].total_tokens, 0);
    let last = updates.last().unwrap();
    assert_eq!(last.total_tokens, 300);
    assert_eq!(last.tasks_running, 0);
}
