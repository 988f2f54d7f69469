use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::common::{TaskError, TimeUtils};
use crate::driver::DriverMetrics;
use crate::driver::context::DriverContext;
use crate::driver::pacemaker::TaskPacemaker;
use crate::store::{Claimed, Settled};

/// 任务驱动器 (The Engine)
///
/// 持有固定数量的 Worker 和一个晋升循环，全部跑在调用方的 Tokio 运行时上。
/// 回调本身是同步的，放进阻塞线程池执行，Worker 只负责等待和回写。
#[derive(Clone)]
pub struct TaskDriver {
    ctx: DriverContext,
}

impl TaskDriver {
    pub fn new(ctx: DriverContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &DriverContext {
        &self.ctx
    }

    /// 启动引擎
    ///
    /// 在 `runtime` 上生成晋升循环和 `workers` 个受监督的 Worker，
    /// 返回的 `JoinSet` 用于停机时等待它们退出。
    pub fn spawn(&self, runtime: &Handle) -> JoinSet<()> {
        let mut join_set = JoinSet::new();

        let pacemaker = TaskPacemaker::new(self.ctx.clone());
        join_set.spawn_on(pacemaker.run(), runtime);

        let workers = self.ctx.config.worker.workers.max(1);
        for worker_id in 0..workers {
            let driver = self.clone();
            join_set.spawn_on(
                async move {
                    let metrics = driver.ctx.metrics.clone();
                    let shutdown = driver.ctx.shutdown.clone();
                    supervise(worker_id, &metrics, || shutdown.is_cancelled(), || {
                        let driver = driver.clone();
                        async move { driver.worker_loop(worker_id).await }
                    })
                    .await;
                },
                runtime,
            );
        }
        info!("[Driver] Started {} workers.", workers);
        join_set
    }

    /// Worker 主循环
    ///
    /// 职责：
    /// 1. 从就绪队列阻塞领取条目 (超时后重新检查停机信号)。
    /// 2. 在记录锁内独占领取，过期条目直接丢弃。
    /// 3. 执行并回写结果。
    async fn worker_loop(&self, worker_id: usize) {
        let store = &self.ctx.store;
        let poll = self.ctx.config.poll_interval();
        trace!("[Driver] Worker-{} waiting for tasks...", worker_id);

        while !self.ctx.is_shutdown() {
            let Some(entry) = store.ready.pop_blocking(poll, &self.ctx.shutdown).await else {
                continue;
            };
            let Some(claimed) = store.claim(&entry) else {
                trace!("[Driver] Worker-{} skipped stale entry {}", worker_id, entry.id);
                continue;
            };
            self.execute(worker_id, claimed).await;
        }
        trace!("[Driver] Worker-{} exiting.", worker_id);
    }

    // ==========================================
    // Core Logic: 执行逻辑
    // ==========================================

    /// 执行任务
    async fn execute(&self, worker_id: usize, claimed: Claimed) {
        let metrics = &self.ctx.metrics;
        metrics.inc_active();
        debug!(
            "[Driver] Worker-{} running task {} ({}), attempt {}",
            worker_id, claimed.id, claimed.name, claimed.attempt
        );

        let handler = claimed.handler.clone();
        let args = claimed.args.clone();
        let start_time = TimeUtils::now();
        let joined = tokio::task::spawn_blocking(move || handler.call(&args)).await;
        let duration = TimeUtils::now() - start_time;

        let result = match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(TaskError::from_anyhow(&e, claimed.attempt)),
            Err(join_err) if join_err.is_panic() => {
                let msg = panic_message(join_err.into_panic().as_ref());
                error!("[Driver] Task {} panicked: {}", claimed.id, msg);
                Err(TaskError::panic(msg, claimed.attempt))
            }
            Err(join_err) => Err(TaskError::new(join_err.to_string(), claimed.attempt)),
        };
        let err_msg = result.as_ref().err().map(|e| e.message.clone());

        // 停机后周期任务不再续期
        let reschedule = !self.ctx.is_shutdown();
        let settled = self
            .ctx
            .store
            .settle(&claimed, result, reschedule, TimeUtils::now());
        record_settled(metrics, &settled);

        let err_msg = err_msg.unwrap_or_default();
        match settled {
            Settled::Completed => {
                debug!("[Driver] Task {} completed in {:?}", claimed.id, duration);
            }
            Settled::Retrying { retry, at } => {
                warn!(
                    "[Driver] Task {} failed on attempt {}: {}. Retry #{} in {:?}",
                    claimed.id,
                    claimed.attempt,
                    err_msg,
                    retry,
                    TimeUtils::until(at)
                );
            }
            Settled::Failed => {
                error!(
                    "[Driver] Task {} failed after {} attempts: {}",
                    claimed.id, claimed.attempt, err_msg
                );
            }
            Settled::Rescheduled { at, failed } => {
                if failed {
                    warn!(
                        "[Driver] Periodic task {} run failed: {}. Next run in {:?}",
                        claimed.id,
                        err_msg,
                        TimeUtils::until(at)
                    );
                } else {
                    debug!(
                        "[Driver] Periodic task {} run finished in {:?}. Next run in {:?}",
                        claimed.id,
                        duration,
                        TimeUtils::until(at)
                    );
                }
            }
            Settled::Stopped { failed } => {
                info!(
                    "[Driver] Periodic task {} stopped after its current run (failed: {})",
                    claimed.id, failed
                );
            }
            Settled::Discarded => {
                debug!(
                    "[Driver] Result of task {} discarded, record was replaced or purged",
                    claimed.id
                );
            }
        }
        metrics.dec_active();
    }
}

fn record_settled(metrics: &DriverMetrics, settled: &Settled) {
    match settled {
        Settled::Completed | Settled::Rescheduled { failed: false, .. } => metrics.inc_success(),
        Settled::Failed | Settled::Rescheduled { failed: true, .. } => metrics.inc_failure(),
        Settled::Retrying { .. } => metrics.inc_retry(),
        Settled::Stopped { failed } => {
            if *failed {
                metrics.inc_failure();
            } else {
                metrics.inc_success();
            }
            metrics.inc_cancelled();
        }
        Settled::Discarded => {}
    }
}

/// Worker 监督
///
/// `make` 每次生成一轮 Worker 循环。循环正常返回视为停机退出；
/// 循环 panic 时记录日志，未停机则重新生成一轮。
pub(crate) async fn supervise<F, Fut, S>(
    worker_id: usize,
    metrics: &Arc<DriverMetrics>,
    is_shutdown: S,
    mut make: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Fn() -> bool,
{
    metrics.inc_workers();
    loop {
        match AssertUnwindSafe(make()).catch_unwind().await {
            Ok(()) => break,
            Err(panic_err) => {
                error!(
                    "[Driver] Worker-{} crashed: {}",
                    worker_id,
                    panic_message(panic_err.as_ref())
                );
                if is_shutdown() {
                    break;
                }
                metrics.inc_restarts();
                warn!("[Driver] Restarting Worker-{}", worker_id);
            }
        }
    }
    metrics.dec_workers();
}

/// 从 panic 载荷里提取可读信息
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Panic: {}", s)
    } else {
        "Panic: Unknown error".to_string()
    }
}
