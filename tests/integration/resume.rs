//! Resuming tasks after a pause or a failure.

use tokio_util::sync::CancellationToken;

use orc::core::execution::PhaseStatus;
use orc::core::task::TaskStatus;
use orc::orchestration::{default_retry_map, plan_resume};
use orc::workflow::PhaseTemplate;

use crate::fixtures::{linear, Harness, Script};

/// Test: Paused run resumes at the interrupted phase
/// Given a run cancelled while implement is running
/// When the task is run again
/// Then spec is not repeated and implement runs a second iteration
#[tokio::test]
async fn test_resume_after_pause() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor();
    h.runner.push("implement", Script::WaitForCancel);

    let handle = executor
        .start(&task_id, &wf, CancellationToken::new())
        .unwrap();
    h.runner.wait_parked().await;
    handle.cancel();
    assert_eq!(handle.wait().await.unwrap(), TaskStatus::Paused);

    let task = h.load(&task_id);
    assert_eq!(
        plan_resume(&task, &default_retry_map()).unwrap(),
        "implement"
    );

    let status = executor
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(
        h.runner.phases_called(),
        vec!["spec", "implement", "implement", "review"]
    );
    let task = h.load(&task_id);
    assert_eq!(task.execution.phase("implement").unwrap().iterations, 2);
    assert_eq!(task.execution.phase("spec").unwrap().iterations, 1);
}

/// Test: Failed task resumes from the retry-map target
/// Given review failed with no iterations left
/// When the task is run again
/// Then the run restarts at implement, the mapped phase
#[tokio::test]
async fn test_failed_task_resumes_from_retry_target() {
    let h = Harness::new();
    h.template(PhaseTemplate::new("review", "Review").with_max_iterations(1));
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor();
    h.runner.always("review", Script::Fail("changes requested".to_string()));

    let status = executor
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Failed);
    let task = h.load(&task_id);
    assert_eq!(task.current_phase.as_deref(), Some("review"));
    assert_eq!(
        plan_resume(&task, &default_retry_map()).unwrap(),
        "implement"
    );

    h.runner.reset("review");
    let status = executor
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(
        h.runner.phases_called(),
        vec!["spec", "implement", "review", "implement", "review"]
    );
    assert!(h.load(&task_id).execution.error.is_none());
}

/// Test: Retry context survives a pause
/// Given review failed and sent execution back to implement
/// When implement is interrupted and the task resumed
/// Then implement receives the retry context and completion clears it
#[tokio::test]
async fn test_retry_context_survives_pause() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor();
    h.runner.push("implement", Script::Succeed);
    h.runner.push("implement", Script::WaitForCancel);
    h.runner.push("review", Script::Fail("missing tests".to_string()));

    let handle = executor
        .start(&task_id, &wf, CancellationToken::new())
        .unwrap();
    h.runner.wait_parked().await;
    handle.cancel();
    assert_eq!(handle.wait().await.unwrap(), TaskStatus::Paused);

    let task = h.load(&task_id);
    let ctx = task.execution.retry_context.clone().unwrap();
    assert_eq!(ctx.from_phase, "review");
    assert_eq!(ctx.to_phase, "implement");
    assert_eq!(
        task.execution.phase_status("implement"),
        PhaseStatus::Interrupted
    );

    let status = executor
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);

    let calls = h.runner.calls();
    let resumed = &calls[calls.len() - 2];
    assert_eq!(resumed.phase, "implement");
    let retry = resumed.retry_context.as_deref().unwrap();
    assert!(retry.contains("## Retry Context"));
    assert!(retry.contains("missing tests"));
    assert!(h.load(&task_id).execution.retry_context.is_none());
}
