use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::Value;
use talos_lane::{SchedulerError, SubmitOptions, TaskArgs, TaskHandler, TaskOutcome, TaskState};

use crate::helpers::{scheduler, wait_for_state};

fn counter(runs: &Arc<AtomicU32>) -> impl TaskHandler {
    let runs = runs.clone();
    move |_: &TaskArgs| -> anyhow::Result<Value> {
        Ok(Value::from(runs.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_task_runs_every_interval() {
    let s = scheduler(2);
    s.start().unwrap();
    let runs = Arc::new(AtomicU32::new(0));

    let id = s
        .submit_periodic(
            counter(&runs),
            Duration::from_secs(1),
            TaskArgs::new(),
            SubmitOptions::new().name("heartbeat"),
        )
        .unwrap();

    // 首次执行在一个周期之后
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(3000)).await;
    let n = runs.load(Ordering::SeqCst);
    assert!((3..=4).contains(&n), "expected 3..=4 runs, got {n}");

    let snap = s.snapshot(&id).unwrap();
    assert_eq!(snap.runs, n as u64);
    assert!(matches!(snap.last_outcome, Some(TaskOutcome::Completed(_))));
    assert_ne!(snap.state, TaskState::Completed);
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failures_do_not_stop_periodic_task() {
    let s = scheduler(1);
    s.start().unwrap();
    let runs = Arc::new(AtomicU32::new(0));
    let seen = runs.clone();

    let id = s
        .submit_periodic(
            move |_: &TaskArgs| -> anyhow::Result<Value> {
                seen.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("sensor offline")
            },
            Duration::from_millis(100),
            TaskArgs::new(),
            SubmitOptions::new(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(runs.load(Ordering::SeqCst) >= 3);

    let snap = s.snapshot(&id).unwrap();
    assert!(matches!(snap.last_outcome, Some(TaskOutcome::Failed(_))));
    assert_eq!(snap.last_error.unwrap().message, "sensor offline");
    assert!(!snap.state.is_terminal());
    assert!(s.stats().failed_count >= 3);
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_between_runs_stops_periodic_task() {
    let s = scheduler(1);
    s.start().unwrap();
    let runs = Arc::new(AtomicU32::new(0));

    let id = s
        .submit_periodic(
            counter(&runs),
            Duration::from_millis(300),
            TaskArgs::new(),
            SubmitOptions::new(),
        )
        .unwrap();

    // 首轮之前处于 Pending，可以直接取消
    assert!(s.cancel(&id).unwrap());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(matches!(
        s.get_result(&id, None).await.unwrap_err(),
        SchedulerError::TaskCancelled(_)
    ));
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_during_run_stops_periodic_task_after_that_run() {
    let s = scheduler(1);
    s.start().unwrap();
    let runs = Arc::new(AtomicU32::new(0));
    let seen = runs.clone();

    let id = s
        .submit_periodic(
            move |_: &TaskArgs| -> anyhow::Result<Value> {
                std::thread::sleep(Duration::from_millis(200));
                Ok(Value::from(seen.fetch_add(1, Ordering::SeqCst) + 1))
            },
            Duration::from_millis(50),
            TaskArgs::new(),
            SubmitOptions::new(),
        )
        .unwrap();
    assert!(wait_for_state(&s, &id, TaskState::Running, Duration::from_secs(2)).await);

    // 运行中的一轮不受影响，返回 false，但之后不再续期
    assert!(!s.cancel(&id).unwrap());
    assert!(s.snapshot(&id).unwrap().cancel_requested);
    assert!(matches!(
        s.get_result(&id, Some(Duration::from_secs(2))).await.unwrap_err(),
        SchedulerError::TaskCancelled(_)
    ));

    let snap = s.snapshot(&id).unwrap();
    assert_eq!(snap.state, TaskState::Cancelled);
    assert_eq!(snap.runs, 1);
    assert!(matches!(snap.last_outcome, Some(TaskOutcome::Completed(_))));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(s.get_status(&id).unwrap(), TaskState::Cancelled);
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_interval_is_rejected() {
    let s = scheduler(1);
    let runs = Arc::new(AtomicU32::new(0));
    let err = s
        .submit_periodic(counter(&runs), Duration::ZERO, TaskArgs::new(), SubmitOptions::new())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInput(_)));

    // 超出单调时钟范围的周期同样拒绝，而不是 panic
    let err = s
        .submit_periodic(counter(&runs), Duration::MAX, TaskArgs::new(), SubmitOptions::new())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInput(_)));
    assert_eq!(s.stats().pending_tasks, 0);
}
