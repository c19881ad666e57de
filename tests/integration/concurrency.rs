//! One run per task; many tasks at once.

use tokio_util::sync::CancellationToken;

use orc::core::task::TaskStatus;
use orc::Error;

use crate::fixtures::{linear, wait_until, Harness, Script};

/// Test: Second run of a running task is refused
/// Given a task parked in implement
/// When a second run is requested
/// Then it fails with AlreadyRunning and the task is untouched
#[tokio::test]
async fn test_second_run_rejected_and_task_unmodified() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor();
    h.runner.push("implement", Script::WaitForCancel);

    let handle = executor
        .start(&task_id, &wf, CancellationToken::new())
        .unwrap();
    h.runner.wait_parked().await;
    let before = serde_json::to_value(h.load(&task_id)).unwrap();

    let err = executor
        .run(&task_id, &wf, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning(ref id) if id == &task_id));
    let err = executor
        .start(&task_id, &wf, CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning(_)));

    assert_eq!(serde_json::to_value(h.load(&task_id)).unwrap(), before);
    assert_eq!(h.runner.count("implement"), 1);

    handle.cancel();
    assert_eq!(handle.wait().await.unwrap(), TaskStatus::Paused);
    assert!(!executor.is_running(&task_id));
}

/// Test: Two simultaneous runs admit exactly one
#[tokio::test]
async fn test_simultaneous_runs_admit_one() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement"]));
    let task_id = h.task("TASK-001");
    let executor = h.executor();

    let (a, b) = tokio::join!(
        executor.run(&task_id, &wf, CancellationToken::new()),
        executor.run(&task_id, &wf, CancellationToken::new()),
    );
    let results = [a, b];
    let completed = results
        .iter()
        .filter(|r| matches!(r, Ok(TaskStatus::Completed)))
        .count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(Error::AlreadyRunning(_))))
        .count();
    assert_eq!((completed, refused), (1, 1));
    assert_eq!(h.runner.count("spec"), 1);
}

/// Test: Independent tasks run concurrently
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_tasks_in_parallel() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["spec", "implement", "review"]));
    let executor = h.executor();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let task_id = h.task(&format!("TASK-{:03}", i));
            executor
                .start(&task_id, &wf, CancellationToken::new())
                .unwrap()
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.wait().await.unwrap(), TaskStatus::Completed);
    }
    assert_eq!(h.runner.calls().len(), 24);
    assert!(executor.registry().is_empty());
}

/// Test: Registry reflects live runs
#[tokio::test]
async fn test_registry_tracks_live_runs() {
    let h = Harness::new();
    let wf = h.workflow("wf", linear(&["implement"]));
    let one = h.task("TASK-001");
    let two = h.task("TASK-002");
    let executor = h.executor();
    h.runner.always("implement", Script::WaitForCancel);

    let first = executor.start(&one, &wf, CancellationToken::new()).unwrap();
    let second = executor.start(&two, &wf, CancellationToken::new()).unwrap();
    wait_until(|| h.runner.count("implement") == 2).await;

    let running: Vec<_> = executor
        .registry()
        .running()
        .into_iter()
        .map(|r| r.task_id)
        .collect();
    assert_eq!(running, vec![one.clone(), two.clone()]);

    assert!(executor.cancel(&one));
    assert_eq!(first.wait().await.unwrap(), TaskStatus::Paused);
    assert!(!executor.is_running(&one));
    assert!(executor.is_running(&two));

    executor.registry().cancel_all();
    assert_eq!(second.wait().await.unwrap(), TaskStatus::Paused);
    assert!(!executor.cancel(&two));
}
