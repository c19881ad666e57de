//! Interrupting runs.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use orc::core::execution::PhaseStatus;
use orc::core::task::TaskStatus;
use orc::events::EventKind;
use orc::orchestration::ExecutorConfig;
use orc::workflow::{GateType, PhaseTemplate};

use crate::fixtures::{linear, task_events, wait_until, Harness, Script};

/// Test: Cancelling mid-phase pauses the task
/// Given implement is running
/// When the run's token is cancelled
/// Then implement is interrupted, the task is paused and a final state
/// event carries the snapshot
#[tokio::test]
async fn test_cancel_mid_phase() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor();
    let mut sub = h.subscribe();
    h.runner.push("implement", Script::WaitForCancel);

    let token = CancellationToken::new();
    let handle = executor.start(&task_id, &wf, token.clone()).unwrap();
    h.runner.wait_parked().await;
    token.cancel();
    assert_eq!(handle.wait().await.unwrap(), TaskStatus::Paused);

    let task = h.load(&task_id);
    assert_eq!(task.status, TaskStatus::Paused);
    assert!(task.executor.is_none());
    let implement = task.execution.phase("implement").unwrap();
    assert_eq!(implement.status, PhaseStatus::Interrupted);
    assert!(implement.interrupted_at.is_some());
    assert_eq!(task.execution.phase_status("review"), PhaseStatus::Pending);
    assert_eq!(h.runner.count("review"), 0);

    let kinds = task_events(sub.drain(), &task_id);
    match kinds.last() {
        Some(EventKind::State { status, execution }) => {
            assert_eq!(*status, TaskStatus::Paused);
            assert_eq!(
                execution.phase_status("implement"),
                PhaseStatus::Interrupted
            );
        }
        other => panic!("expected final state event, got {:?}", other),
    }
    assert!(!executor.is_running(&task_id));
}

/// Test: Cancelling by task id through the executor
#[tokio::test]
async fn test_cancel_by_task_id() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["implement"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor();
    h.runner.push("implement", Script::WaitForCancel);

    let handle = executor
        .start(&task_id, &wf, CancellationToken::new())
        .unwrap();
    h.runner.wait_parked().await;
    assert!(executor.cancel(&task_id));
    assert_eq!(handle.wait().await.unwrap(), TaskStatus::Paused);
    assert!(!executor.cancel(&task_id));
}

/// Test: Token cancelled before the run starts
#[tokio::test]
async fn test_already_cancelled_token_pauses_at_first_phase() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement"]));
    let task_id = h.task("TASK-001");

    let token = CancellationToken::new();
    token.cancel();
    let status = h.executor().run(&task_id, &wf, token).await.unwrap();
    assert_eq!(status, TaskStatus::Paused);
    assert!(h.runner.calls().is_empty());
    assert_eq!(
        h.load(&task_id).execution.phase_status("spec"),
        PhaseStatus::Interrupted
    );
}

/// Test: Cancelling during a human gate wait
/// Given review waits on a human gate
/// When the run is cancelled
/// Then the task pauses and the gate is released from the broker
#[tokio::test]
async fn test_cancel_during_gate_wait() {
    let h = Harness::new();
    h.template(PhaseTemplate::new("review", "Review").with_gate(GateType::Human));
    let wf = h.workflow("wf", linear(&["implement", "review"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor();

    let handle = executor
        .start(&task_id, &wf, CancellationToken::new())
        .unwrap();
    wait_until(|| !h.broker.list_pending(Some(&task_id)).is_empty()).await;
    handle.cancel();
    assert_eq!(handle.wait().await.unwrap(), TaskStatus::Paused);

    assert!(h.broker.list_pending(None).is_empty());
    let task = h.load(&task_id);
    assert_eq!(task.execution.phase_status("review"), PhaseStatus::Interrupted);
    assert_eq!(h.runner.count("review"), 0);
}

/// Test: Gate timeout pauses the run
#[tokio::test]
async fn test_gate_timeout_pauses() {
    let h = Harness::new();
    h.template(PhaseTemplate::new("review", "Review").with_gate(GateType::Human));
    let wf = h.workflow("wf", linear(&["review"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor_with(ExecutorConfig {
        gate_timeout: Some(Duration::from_millis(50)),
        ..ExecutorConfig::default()
    });

    let status = executor
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Paused);
    assert!(h.runner.calls().is_empty());
}
