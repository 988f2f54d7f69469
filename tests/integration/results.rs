use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use talos_lane::{SchedulerError, SubmitOptions, TaskArgs, TaskOutcome, TaskState};

use crate::helpers::{new_log, record, scheduler, sleeper, wait_for_state};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_result_waits_or_times_out() {
    let s = scheduler(2);
    s.start().unwrap();

    let slow_a = s
        .submit(
            sleeper(Duration::from_secs(2), json!("a")),
            TaskArgs::new(),
            SubmitOptions::new(),
        )
        .unwrap();
    let slow_b = s
        .submit(
            sleeper(Duration::from_secs(2), json!("b")),
            TaskArgs::new(),
            SubmitOptions::new(),
        )
        .unwrap();

    let err = s
        .get_result(&slow_b, Some(Duration::from_millis(500)))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Timeout { ref task_id, .. } if *task_id == slow_b));

    let value = s
        .get_result(&slow_a, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(value, json!("a"));

    // 超时不影响任务本身
    let value = s.get_result(&slow_b, None).await.unwrap();
    assert_eq!(value, json!("b"));
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handler_receives_arguments() {
    let s = scheduler(1);
    s.start().unwrap();

    let id = s
        .submit(
            |args: &TaskArgs| -> anyhow::Result<Value> {
                let name: String = args.get(0)?;
                let times: usize = args.get_kw("times")?.unwrap_or(1);
                Ok(json!(name.repeat(times)))
            },
            TaskArgs::new().arg("ab").kwarg("times", 3),
            SubmitOptions::new().name("repeat"),
        )
        .unwrap();

    assert_eq!(
        s.get_result(&id, Some(Duration::from_secs(5))).await.unwrap(),
        json!("ababab")
    );
    assert_eq!(s.snapshot(&id).unwrap().name, "repeat");
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_before_dequeue() {
    let s = scheduler(1);
    s.start().unwrap();
    let log = new_log();

    let id = s
        .submit(
            record(&log, "cancelled"),
            TaskArgs::new(),
            SubmitOptions::new().delay_secs(0.2),
        )
        .unwrap();
    assert!(s.cancel(&id).unwrap());
    assert_eq!(s.get_status(&id).unwrap(), TaskState::Cancelled);
    assert!(!s.cancel(&id).unwrap());

    let err = s.get_result(&id, Some(Duration::from_secs(1))).await.unwrap_err();
    assert!(matches!(err, SchedulerError::TaskCancelled(_)));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(log.lock().is_empty());
    assert_eq!(s.stats().cancelled_count, 1);
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_after_claim_is_rejected() {
    let s = scheduler(1);
    s.start().unwrap();

    let id = s
        .submit(
            sleeper(Duration::from_millis(300), json!("finished")),
            TaskArgs::new(),
            SubmitOptions::new(),
        )
        .unwrap();
    assert!(wait_for_state(&s, &id, TaskState::Running, Duration::from_secs(2)).await);

    assert!(!s.cancel(&id).unwrap());
    assert_eq!(
        s.get_result(&id, Some(Duration::from_secs(5))).await.unwrap(),
        json!("finished")
    );
    assert_eq!(s.get_status(&id).unwrap(), TaskState::Completed);
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn claim_and_cancel_never_both_succeed() {
    let s = Arc::new(scheduler(4));
    let runs = Arc::new(AtomicU32::new(0));

    let ids: Vec<String> = (0..200)
        .map(|_| {
            let runs = runs.clone();
            s.submit(
                move |_: &TaskArgs| -> anyhow::Result<Value> {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                },
                TaskArgs::new(),
                SubmitOptions::new(),
            )
            .unwrap()
        })
        .collect();

    s.start().unwrap();
    let canceller = {
        let s = s.clone();
        let ids = ids.clone();
        tokio::spawn(async move { ids.iter().filter(|id| s.cancel(id).unwrap()).count() })
    };
    let cancelled = canceller.await.unwrap();

    let mut completed = 0;
    for id in &ids {
        match s.wait(id, Some(Duration::from_secs(5))).await.unwrap() {
            TaskOutcome::Completed(_) => completed += 1,
            TaskOutcome::Cancelled => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(completed + cancelled, 200);
    assert_eq!(runs.load(Ordering::SeqCst) as usize, completed);
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_ids_are_reported() {
    let s = scheduler(1);
    assert!(matches!(
        s.get_status("ghost").unwrap_err(),
        SchedulerError::TaskNotFound(_)
    ));
    assert!(matches!(
        s.cancel("ghost").unwrap_err(),
        SchedulerError::TaskNotFound(_)
    ));
    assert!(matches!(
        s.get_result("ghost", None).await.unwrap_err(),
        SchedulerError::TaskNotFound(_)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshot_serializes_tagged_outcome() {
    let s = scheduler(1);
    s.start().unwrap();

    let id = s
        .submit(
            |_: &TaskArgs| -> anyhow::Result<Value> { Ok(json!({ "rows": 3 })) },
            TaskArgs::new(),
            SubmitOptions::new().task_id("export-1"),
        )
        .unwrap();
    assert_eq!(id, "export-1");
    s.wait(&id, Some(Duration::from_secs(5))).await.unwrap();

    let snap = serde_json::to_value(s.snapshot(&id).unwrap()).unwrap();
    assert_eq!(snap["state"], json!("COMPLETED"));
    assert_eq!(snap["priority"], json!("NORMAL"));
    assert_eq!(
        snap["outcome"],
        json!({ "status": "COMPLETED", "value": { "rows": 3 } })
    );
    s.stop(true).await.unwrap();
}
