use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::common::{RetentionConfig, Result, SchedulerConfig};
use crate::scheduler::Scheduler;

/// 调度器构建器
///
/// 用于一步步配置并生成 [`Scheduler`] 实例，`build()` 时统一校验。
#[derive(Debug, Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    /// 外部停机信号 (可选注入，用于多组件协同)
    shutdown_token: Option<CancellationToken>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换配置
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Worker 数量，构造后固定
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.worker.workers = workers;
        self
    }

    /// Worker 在空队列上的最长阻塞时间
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.worker.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 延时任务晋升的最长间隔
    pub fn promotion_tick(mut self, tick: Duration) -> Self {
        self.config.policy.promotion_tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 停机等待上限，按秒向上取整；`Duration::ZERO` 表示一直等
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs();
        self.config.policy.shutdown_timeout_secs = if timeout.subsec_nanos() > 0 {
            secs.saturating_add(1)
        } else {
            secs
        };
        self
    }

    pub fn retention(mut self, retention: RetentionConfig) -> Self {
        self.config.retention = retention;
        self
    }

    /// [可选] 挂到一个外部停机信号上
    ///
    /// 外部信号取消时调度器随之停机；调度器自己停机不会影响外部信号。
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = Some(token);
        self
    }

    /// [核心] 构建调度器
    pub fn build(self) -> Result<Scheduler> {
        self.config.validate()?;
        let token = match self.shutdown_token {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        Ok(Scheduler::from_parts(self.config, token))
    }
}
