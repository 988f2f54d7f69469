use std::time::Duration;

use thiserror::Error;

use crate::common::model::TaskError;

/// 调度器统一结果类型
///
/// 使用此别名可以简化函数签名：`fn do_something() -> Result<()>`
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    // ==========================================
    // 1. 配置与输入校验 (Configuration & Validation)
    // ==========================================
    /// 配置错误
    ///
    /// - 触发场景: `SchedulerBuilder::build()` 时参数校验不通过 (如 0 个 Worker)。
    /// - 处理: 检查配置项。
    #[error("Configuration error: {0}")]
    Config(String),

    /// 提交参数非法
    ///
    /// - 触发场景: 负数/NaN 延时、空任务 ID、未知优先级、0 间隔的周期任务、
    ///   重复提交一个仍未结束的任务 ID。
    /// - 后果: 在调用点立即失败，任务不会入队。
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==========================================
    // 2. 查询与等待 (Query & Wait)
    // ==========================================
    /// 任务不存在
    ///
    /// - 触发场景: 查询一个从未提交、或已被保留策略清理掉的任务 ID。
    #[error("Task {0} not found.")]
    TaskNotFound(String),

    /// 等待结果超时
    ///
    /// - 触发场景: `get_result` / `wait` 在截止时间前任务未进入终态。
    /// - 说明: 任务本身不受影响，仍会继续执行。
    #[error("Timed out after {waited:?} waiting for task {task_id}.")]
    Timeout { task_id: String, waited: Duration },

    /// 任务执行失败 (重试已耗尽)
    ///
    /// - 触发场景: `get_result` 读取到一个 Failed 状态的任务。
    /// - 说明: `error` 是记录在任务上的最后一次失败信息。
    #[error("Task {task_id} failed: {error}")]
    TaskFailed { task_id: String, error: TaskError },

    /// 任务已取消
    #[error("Task {0} was cancelled.")]
    TaskCancelled(String),

    // ==========================================
    // 3. 生命周期 (Lifecycle)
    // ==========================================
    /// 调度器已停机
    ///
    /// - 触发场景: 在调用 `stop()` 之后仍有客户端尝试提交新任务。
    #[error("Scheduler is stopping or stopped, rejecting new tasks.")]
    SchedulerShutdown,

    /// 生命周期误用
    ///
    /// - 触发场景: 停机后再次 `start()`，或在 Tokio 运行时之外调用 `start()`。
    #[error("Scheduler state error: {0}")]
    SchedulerState(String),

    /// 优雅停机超时
    ///
    /// - 触发场景: 配置了 `shutdown_timeout_secs` 且 `stop(true)` 等待 Worker 退出超时。
    /// - 说明: 通常意味着某个任务回调仍在阻塞执行。
    #[error("Shutdown did not finish within {0:?}.")]
    ShutdownTimeout(Duration),

    // ==========================================
    // 4. 数据 (Data)
    // ==========================================
    /// 序列化/反序列化失败
    ///
    /// - 触发场景: 配置 JSON 格式错误，或任务参数无法转换为目标类型。
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchedulerError {
    /// 是否是调用方输入问题 (参数/配置)，而非运行期状态
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidInput(_) | SchedulerError::Config(_)
        )
    }

    /// 终态错误：任务已经结束，再等也不会有结果
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskFailed { .. } | SchedulerError::TaskCancelled(_)
        )
    }
}
