use std::time::Duration;

use crate::common::TaskPriority;
use crate::policy::RetryBackoff;

/// 提交选项
///
/// ```ignore
/// let opts = SubmitOptions::new()
///     .priority(TaskPriority::High)
///     .delay_secs(2.5)
///     .max_retries(3)
///     .task_id("report-2024-06");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOptions {
    pub priority: TaskPriority,
    /// 延时 (秒)。负数、NaN、无穷大在提交时被拒绝。周期任务忽略此项。
    pub delay_secs: f64,
    /// 失败后的最大重试次数，总执行次数最多为 `max_retries + 1`
    pub max_retries: u32,
    /// 自定义任务 ID，缺省时自动生成
    pub task_id: Option<String>,
    /// 展示用名称，缺省时等于任务 ID
    pub name: Option<String>,
    pub retry_backoff: RetryBackoff,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn delay_secs(mut self, secs: f64) -> Self {
        self.delay_secs = secs;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay_secs = delay.as_secs_f64();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn retry_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.retry_backoff = backoff;
        self
    }
}
