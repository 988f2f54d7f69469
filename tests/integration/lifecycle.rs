use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use talos_lane::{
    RetentionConfig, Scheduler, SchedulerConfig, SchedulerError, SubmitOptions, TaskArgs,
    TaskState,
};

use crate::helpers::{init_tracing, new_log, record, scheduler, sleeper, wait_for_state};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_scheduler_rejects_work() {
    let s = scheduler(1);
    s.start().unwrap();
    assert!(s.is_running());

    s.stop(true).await.unwrap();
    assert!(s.is_shutdown());
    assert!(!s.is_running());

    let log = new_log();
    let err = s
        .submit(record(&log, "late"), TaskArgs::new(), SubmitOptions::new())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::SchedulerShutdown));
    assert!(matches!(s.start().unwrap_err(), SchedulerError::SchedulerState(_)));

    // 重复停机无副作用
    s.stop(true).await.unwrap();
    s.stop(false).await.unwrap();
}

#[test]
fn start_requires_a_runtime() {
    let s = scheduler(1);
    let err = s.start().unwrap_err();
    assert!(matches!(err, SchedulerError::SchedulerState(_)));
    assert!(!s.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_is_idempotent() {
    let s = scheduler(2);
    s.start().unwrap();
    s.start().unwrap();

    let id = s
        .submit(
            |_: &TaskArgs| -> anyhow::Result<Value> { Ok(json!(1)) },
            TaskArgs::new(),
            SubmitOptions::new(),
        )
        .unwrap();
    assert_eq!(s.get_result(&id, Some(Duration::from_secs(5))).await.unwrap(), json!(1));
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_reports_timeout_without_aborting_running_task() {
    init_tracing();
    let s = Scheduler::builder()
        .config(SchedulerConfig::new_dev())
        .workers(1)
        .shutdown_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    s.start().unwrap();

    let id = s
        .submit(
            sleeper(Duration::from_millis(2500), json!("slow")),
            TaskArgs::new(),
            SubmitOptions::new(),
        )
        .unwrap();
    assert!(wait_for_state(&s, &id, TaskState::Running, Duration::from_secs(2)).await);

    let err = s.stop(true).await.unwrap_err();
    assert!(matches!(err, SchedulerError::ShutdownTimeout(_)));

    // Worker 没有被强行中断，回调跑完后结果照常写回
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(s.get_status(&id).unwrap(), TaskState::Completed);
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_without_timeout_waits_for_running_task() {
    init_tracing();
    let s = Scheduler::builder()
        .config(SchedulerConfig::new_dev())
        .workers(1)
        .shutdown_timeout(Duration::ZERO)
        .build()
        .unwrap();
    s.start().unwrap();

    let id = s
        .submit(
            sleeper(Duration::from_millis(1500), json!("slow")),
            TaskArgs::new(),
            SubmitOptions::new(),
        )
        .unwrap();
    assert!(wait_for_state(&s, &id, TaskState::Running, Duration::from_secs(2)).await);

    s.stop(true).await.unwrap();
    assert_eq!(s.get_status(&id).unwrap(), TaskState::Completed);
    assert_eq!(s.stats().active_workers, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resubmitting_a_purged_id_honours_the_new_delay() {
    let s = scheduler(1);
    s.start().unwrap();
    let log = new_log();

    let first = s
        .submit(
            record(&log, "old"),
            TaskArgs::new(),
            SubmitOptions::new().task_id("job").delay_secs(0.3),
        )
        .unwrap();
    assert!(s.cancel(&first).unwrap());
    s.purge(&first).unwrap();

    s.submit(
        record(&log, "new"),
        TaskArgs::new(),
        SubmitOptions::new().task_id("job").delay_secs(5.0),
    )
    .unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(s.get_status("job").unwrap(), TaskState::Pending);
    assert!(log.lock().is_empty());
    s.stop(false).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_ids_are_reused_only_after_finishing() {
    let s = scheduler(1);
    let log = new_log();

    s.submit(record(&log, "first"), TaskArgs::new(), SubmitOptions::new().task_id("job"))
        .unwrap();
    let err = s
        .submit(record(&log, "dup"), TaskArgs::new(), SubmitOptions::new().task_id("job"))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInput(_)));
    let err = s
        .submit(record(&log, "blank"), TaskArgs::new(), SubmitOptions::new().task_id("  "))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInput(_)));

    s.start().unwrap();
    assert_eq!(s.get_result("job", Some(Duration::from_secs(5))).await.unwrap(), json!("first"));

    s.submit(record(&log, "second"), TaskArgs::new(), SubmitOptions::new().task_id("job"))
        .unwrap();
    assert_eq!(s.get_result("job", Some(Duration::from_secs(5))).await.unwrap(), json!("second"));
    assert_eq!(*log.lock(), vec!["first".to_string(), "second".to_string()]);
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retention_sweeps_oldest_finished_records() {
    init_tracing();
    let s = Scheduler::builder()
        .config(SchedulerConfig::new_dev())
        .workers(1)
        .retention(RetentionConfig {
            finished_ttl_secs: 0,
            max_finished: 2,
            sweep_interval_secs: 1,
        })
        .build()
        .unwrap();
    let log = new_log();
    for i in 0..5 {
        let id = format!("t{i}");
        s.submit(record(&log, &id), TaskArgs::new(), SubmitOptions::new().task_id(id.clone()))
            .unwrap();
    }
    s.start().unwrap();
    s.wait("t4", Some(Duration::from_secs(5))).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    for id in ["t0", "t1", "t2"] {
        assert!(matches!(s.get_status(id).unwrap_err(), SchedulerError::TaskNotFound(_)));
    }
    assert_eq!(s.get_status("t3").unwrap(), TaskState::Completed);
    assert_eq!(s.get_status("t4").unwrap(), TaskState::Completed);
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cleanup_and_purge_remove_finished_records() {
    let s = scheduler(1);
    let log = new_log();
    let done = s
        .submit(record(&log, "a"), TaskArgs::new(), SubmitOptions::new())
        .unwrap();
    let other = s
        .submit(record(&log, "b"), TaskArgs::new(), SubmitOptions::new())
        .unwrap();
    let later = s
        .submit(record(&log, "c"), TaskArgs::new(), SubmitOptions::new().delay_secs(30.0))
        .unwrap();

    assert!(matches!(s.purge(&later).unwrap_err(), SchedulerError::InvalidInput(_)));
    assert!(matches!(s.purge("ghost").unwrap_err(), SchedulerError::TaskNotFound(_)));

    s.start().unwrap();
    s.wait(&done, Some(Duration::from_secs(5))).await.unwrap();
    s.wait(&other, Some(Duration::from_secs(5))).await.unwrap();

    s.purge(&done).unwrap();
    assert!(s.get_status(&done).is_err());

    assert_eq!(s.cleanup(), 1);
    assert!(s.get_status(&other).is_err());
    assert_eq!(s.get_status(&later).unwrap(), TaskState::Pending);
    s.stop(true).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_tasks_complete_across_workers() {
    let s = Arc::new(scheduler(4));
    s.start().unwrap();

    let ids: Vec<String> = (0..100usize)
        .map(|i| {
            s.submit(
                move |_: &TaskArgs| -> anyhow::Result<Value> {
                    std::thread::sleep(Duration::from_millis(2));
                    Ok(json!(i * i))
                },
                TaskArgs::new(),
                SubmitOptions::new(),
            )
            .unwrap()
        })
        .collect();

    for (i, id) in ids.iter().enumerate() {
        let value = s.get_result(id, Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(value, json!(i * i));
    }
    // 计数在结果写回之后才更新，等 Worker 全部退出再读
    s.stop(true).await.unwrap();
    let stats = s.stats();
    assert_eq!(stats.completed_count, 100);
    assert_eq!(stats.pending_tasks, 0);
    assert_eq!(stats.running_tasks, 0);
    assert_eq!(stats.active_workers, 0);
}
