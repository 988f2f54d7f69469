//! 集成测试共用的辅助函数

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use talos_lane::{Scheduler, SchedulerConfig, TaskArgs, TaskHandler, TaskState};
use tracing_subscriber::EnvFilter;

/// 每个测试二进制只安装一次日志订阅器，`RUST_LOG=talos_lane=debug` 可查看日志
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 快节奏配置的调度器，`workers` 个 Worker (尚未启动)
pub(crate) fn scheduler(workers: usize) -> Scheduler {
    init_tracing();
    Scheduler::builder()
        .config(SchedulerConfig::new_dev())
        .workers(workers)
        .build()
        .expect("valid dev config")
}

/// 共享的执行记录
pub(crate) type Log = Arc<Mutex<Vec<String>>>;

pub(crate) fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// 把 `label` 追加到 `log` 并原样返回的回调
pub(crate) fn record(log: &Log, label: &str) -> impl TaskHandler {
    let log = log.clone();
    let label = label.to_string();
    move |_: &TaskArgs| -> anyhow::Result<Value> {
        log.lock().push(label.clone());
        Ok(json!(label))
    }
}

/// 阻塞 `d` 后返回 `value` 的回调
pub(crate) fn sleeper(d: Duration, value: Value) -> impl TaskHandler {
    move |_: &TaskArgs| -> anyhow::Result<Value> {
        std::thread::sleep(d);
        Ok(value.clone())
    }
}

/// 轮询 `get_status`，直到出现 `state` 或超过 `within`
pub(crate) async fn wait_for_state(
    scheduler: &Scheduler,
    id: &str,
    state: TaskState,
    within: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if scheduler.get_status(id).ok() == Some(state) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
