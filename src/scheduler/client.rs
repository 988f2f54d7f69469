use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::model::NewTask;
use crate::common::{
    Result, ScheduleType, SchedulerConfig, SchedulerError, SchedulerStats, TaskArgs, TaskHandler,
    TaskOutcome, TaskSnapshot, TaskState, TimeUtils, into_handler, new_task_id,
};
use crate::driver::{DriverContext, TaskDriver};
use crate::scheduler::{SchedulerBuilder, SubmitOptions};

/// 生命周期状态
#[derive(Default)]
struct Lifecycle {
    started: bool,
    stopped: bool,
    /// 晋升循环 + 所有 Worker
    tasks: Option<JoinSet<()>>,
}

/// 任务调度器
///
/// - 显式构造、显式持有，没有全局单例；同一进程可以同时存在多个互不干扰的实例。
/// - 所有后台任务跑在调用 `start()` 时所在的 Tokio 运行时上。
/// - 实例被 Drop 时自动发出停机信号。
///
/// ```ignore
/// let scheduler = Scheduler::builder().workers(2).build()?;
/// scheduler.start()?;
/// let id = scheduler.submit(
///     |args: &TaskArgs| -> anyhow::Result<Value> { Ok(json!(args.get::<i64>(0)? * 2)) },
///     TaskArgs::new().arg(21),
///     SubmitOptions::new().priority(TaskPriority::High),
/// )?;
/// assert_eq!(scheduler.get_result(&id, None).await?, json!(42));
/// scheduler.stop(true).await?;
/// ```
pub struct Scheduler {
    ctx: DriverContext,
    driver: TaskDriver,
    lifecycle: Mutex<Lifecycle>,
}

impl Scheduler {
    /// 使用给定配置创建调度器 (尚未启动)
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        SchedulerBuilder::new().config(config).build()
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_parts(config: SchedulerConfig, shutdown: CancellationToken) -> Self {
        let ctx = DriverContext::new(config, shutdown);
        let driver = TaskDriver::new(ctx.clone());
        Self {
            ctx,
            driver,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.ctx.config
    }

    // ==========================================
    // 1. 提交 (Submit)
    // ==========================================

    /// 提交一次性任务 (可带延时)
    ///
    /// # 错误
    /// - `SchedulerShutdown`: 已停机。
    /// - `InvalidInput`: 非法延时、空 ID、ID 被未结束的任务占用。
    pub fn submit<H: TaskHandler>(
        &self,
        handler: H,
        args: TaskArgs,
        opts: SubmitOptions,
    ) -> Result<String> {
        self.ensure_accepting()?;
        let delay = TimeUtils::delay_from_secs(opts.delay_secs)?;
        let schedule = if delay.is_zero() {
            ScheduleType::Once
        } else {
            ScheduleType::Delay(delay)
        };
        self.install(handler, args, opts, schedule)
    }

    /// 提交周期任务
    ///
    /// 首次执行在 `interval` 之后；每一轮得出最终结果 (成功，或重试耗尽后失败) 后
    /// 以同一个 ID 在 `interval` 之后再次执行，直到被取消或调度器停机。
    /// `opts.delay_secs` 被忽略。
    pub fn submit_periodic<H: TaskHandler>(
        &self,
        handler: H,
        interval: Duration,
        args: TaskArgs,
        opts: SubmitOptions,
    ) -> Result<String> {
        self.ensure_accepting()?;
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInput(
                "periodic interval must be greater than zero".into(),
            ));
        }
        self.install(handler, args, opts, ScheduleType::Periodic { interval })
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.ctx.is_shutdown() {
            warn!("[Scheduler] Rejecting submission, scheduler is stopped.");
            return Err(SchedulerError::SchedulerShutdown);
        }
        Ok(())
    }

    fn install<H: TaskHandler>(
        &self,
        handler: H,
        args: TaskArgs,
        opts: SubmitOptions,
        schedule: ScheduleType,
    ) -> Result<String> {
        let id = match opts.task_id {
            Some(id) if id.trim().is_empty() => {
                return Err(SchedulerError::InvalidInput("task id cannot be empty".into()));
            }
            Some(id) => id,
            None => new_task_id(),
        };
        let name = opts
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id.clone());

        let store = &self.ctx.store;
        let task = NewTask {
            id,
            name,
            handler: into_handler(handler),
            args,
            priority: opts.priority,
            schedule,
            max_retries: opts.max_retries,
            retry_backoff: opts.retry_backoff,
            seq: store.next_seq(),
        };
        let id = store.insert(task, TimeUtils::now())?;
        debug!(
            "[Scheduler] Submitted task {} (priority {}, {:?})",
            id, opts.priority, schedule
        );
        Ok(id)
    }

    // ==========================================
    // 2. 控制与查询 (Control & Query)
    // ==========================================

    /// 取消任务
    ///
    /// 返回 `true` 当且仅当任务原本在排队 (Pending) 且现在已取消。
    /// 运行中的任务不可取消，返回 `false`，本次执行不受影响；
    /// 若是周期任务，本轮结束后停止续期并进入 Cancelled。
    pub fn cancel(&self, task_id: &str) -> Result<bool> {
        let cancelled = self.ctx.store.cancel(task_id, TimeUtils::now())?;
        if cancelled {
            self.ctx.metrics.inc_cancelled();
            debug!("[Scheduler] Task {} cancelled", task_id);
        } else {
            debug!("[Scheduler] Task {} not cancellable in its current state", task_id);
        }
        Ok(cancelled)
    }

    pub fn get_status(&self, task_id: &str) -> Result<TaskState> {
        self.ctx.store.state(task_id)
    }

    pub fn snapshot(&self, task_id: &str) -> Result<TaskSnapshot> {
        self.ctx.store.snapshot(task_id)
    }

    /// 等待任务结束并取出结果
    ///
    /// - Completed: 返回值。
    /// - Failed: `TaskFailed`，带最后一次的错误信息。
    /// - Cancelled: `TaskCancelled`。
    /// - 截止前未结束: `Timeout`，任务本身继续执行。
    pub async fn get_result(&self, task_id: &str, timeout: Option<Duration>) -> Result<Value> {
        self.wait(task_id, timeout).await?.into_result(task_id)
    }

    /// 等待任务结束，返回带标签的结果
    pub async fn wait(&self, task_id: &str, timeout: Option<Duration>) -> Result<TaskOutcome> {
        self.ctx.store.wait_outcome(task_id, timeout).await
    }

    pub fn stats(&self) -> SchedulerStats {
        let store = &self.ctx.store;
        let metrics = &self.ctx.metrics;
        let counts = store.counts();
        SchedulerStats {
            pending_tasks: counts.pending,
            ready_queue_len: store.ready_len(),
            delayed_queue_len: store.delayed_len(),
            running_tasks: counts.running,
            completed_count: metrics.total_success.load(Ordering::Relaxed),
            failed_count: metrics.total_failure.load(Ordering::Relaxed),
            cancelled_count: metrics.total_cancelled.load(Ordering::Relaxed),
            retry_count: metrics.total_retries.load(Ordering::Relaxed),
            active_workers: metrics.active_workers.load(Ordering::Relaxed),
            worker_restarts: metrics.worker_restarts.load(Ordering::Relaxed),
        }
    }

    /// 删除一条终态记录
    pub fn purge(&self, task_id: &str) -> Result<()> {
        self.ctx.store.purge(task_id)
    }

    /// 删除全部终态记录，返回删除数量
    pub fn cleanup(&self) -> usize {
        let removed = self.ctx.store.cleanup();
        debug!("[Scheduler] Cleanup removed {} finished tasks", removed);
        removed
    }

    // ==========================================
    // 3. 生命周期 (Lifecycle)
    // ==========================================

    /// 启动 Worker 和晋升循环
    ///
    /// 运行中重复调用无副作用；停机后调用返回 `SchedulerState`。
    /// 必须在 Tokio 运行时内调用。
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.stopped || self.ctx.is_shutdown() {
            return Err(SchedulerError::SchedulerState(
                "scheduler has been stopped and cannot be restarted".into(),
            ));
        }
        if lifecycle.started {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|e| {
            SchedulerError::SchedulerState(format!("start() requires a Tokio runtime: {e}"))
        })?;
        lifecycle.tasks = Some(self.driver.spawn(&runtime));
        lifecycle.started = true;
        info!(
            "[Scheduler] Started with {} workers.",
            self.ctx.config.worker.workers
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().started && !self.ctx.is_shutdown()
    }

    pub fn is_shutdown(&self) -> bool {
        self.ctx.is_shutdown()
    }

    /// 停机
    ///
    /// 发出停机信号：Worker 跑完手头的任务后退出，排队中的任务保持 Pending。
    /// `wait = true` 时等待所有后台任务退出；配置了 `shutdown_timeout` 时最多等这么久，
    /// 否则一直等到最后一个回调返回。
    /// 重复调用无副作用。
    pub async fn stop(&self, wait: bool) -> Result<()> {
        let tasks = {
            let mut lifecycle = self.lifecycle.lock();
            if !lifecycle.stopped {
                lifecycle.stopped = true;
                info!("[Scheduler] Shutdown triggered.");
            }
            self.ctx.shutdown.cancel();
            if wait { lifecycle.tasks.take() } else { None }
        };
        let Some(mut tasks) = tasks else {
            return Ok(());
        };

        let Some(timeout) = self.ctx.config.shutdown_timeout() else {
            while tasks.join_next().await.is_some() {}
            info!("[Scheduler] Shutdown complete.");
            return Ok(());
        };
        let drained = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => {
                info!("[Scheduler] Shutdown complete.");
                Ok(())
            }
            Err(_) => {
                warn!(
                    "[Scheduler] {} background tasks still running after {:?}",
                    tasks.len(),
                    timeout
                );
                // 放回去，避免 JoinSet 被 Drop 时强行 abort 仍在执行回调的 Worker
                self.lifecycle.lock().tasks = Some(tasks);
                Err(SchedulerError::ShutdownTimeout(timeout))
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.ctx.shutdown.cancel();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.ctx.config)
            .field("shutdown", &self.ctx.is_shutdown())
            .finish_non_exhaustive()
    }
}
