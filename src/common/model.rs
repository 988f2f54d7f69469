use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::common::{SchedulerError, TaskArgs, TaskHandler, TimeUtils};
use crate::policy::RetryBackoff;
use crate::queue::QueueEntry;

// ==========================================
// 1. 优先级 (TaskPriority)
// ==========================================

/// 任务优先级
///
/// 数值越大越先被执行：`Low < Normal < High < Critical`。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl TaskPriority {
    /// 数值等级 (0..=3)
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl TryFrom<i64> for TaskPriority {
    type Error = SchedulerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TaskPriority::Low),
            1 => Ok(TaskPriority::Normal),
            2 => Ok(TaskPriority::High),
            3 => Ok(TaskPriority::Critical),
            other => Err(SchedulerError::InvalidInput(format!(
                "unknown priority level {other} (expected 0..=3)"
            ))),
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskPriority::Low => "LOW",
            TaskPriority::Normal => "NORMAL",
            TaskPriority::High => "HIGH",
            TaskPriority::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

// ==========================================
// 2. 任务状态枚举 (TaskState)
// ==========================================

/// 任务生命周期状态
///
/// ```text
/// Pending ──claim──> Running ──Ok──> Completed
///    │                  │ ──Err (retries == max)──> Failed
///    │                  └──Err (retries <  max)──> Pending
///    └──cancel──> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    /// 等待中
    /// - 任务在就绪队列或延时堆中，尚未被 Worker 领取。
    Pending,

    /// 运行中
    /// - 任务已被某个 Worker 独占领取，回调正在执行。
    /// - 此状态下不可取消。
    Running,

    /// 已完成
    Completed,

    /// 已失败
    /// - 回调报错，且重试次数已耗尽。
    Failed,

    /// 已取消
    /// - 在被领取之前由调用方取消。
    Cancelled,
}

impl TaskState {
    /// 状态是否是终态（不可流转）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

// ==========================================
// 3. 调度类型 (ScheduleType)
// ==========================================

/// 任务调度类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScheduleType {
    /// 一次性任务 (立即执行)
    Once,

    /// 延时任务：提交后经过指定时长才可执行。
    Delay(Duration),

    /// 周期任务
    /// - 每次运行得出最终结果后 (成功或重试耗尽)，在 `interval` 之后以同一个 ID 再次执行。
    /// - 直到被取消或调度器停机。
    Periodic { interval: Duration },
}

impl ScheduleType {
    pub fn is_periodic(&self) -> bool {
        matches!(self, ScheduleType::Periodic { .. })
    }
}

// ==========================================
// 4. 执行结果 (TaskOutcome / TaskError)
// ==========================================

/// 回调失败信息
///
/// `anyhow::Error` 不能 Clone，这里把错误链展平成字符串后存到任务上。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// 错误链 (`{:#}` 格式)
    pub message: String,
    /// 失败发生在第几次尝试 (从 1 开始)
    pub attempt: u32,
    /// 是否由 panic 引起
    #[serde(default)]
    pub panicked: bool,
}

impl TaskError {
    pub fn new(message: impl Into<String>, attempt: u32) -> Self {
        Self {
            message: message.into(),
            attempt,
            panicked: false,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error, attempt: u32) -> Self {
        Self::new(format!("{err:#}"), attempt)
    }

    pub fn panic(message: impl Into<String>, attempt: u32) -> Self {
        Self {
            message: message.into(),
            attempt,
            panicked: true,
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (attempt {})", self.message, self.attempt)
    }
}

impl std::error::Error for TaskError {}

/// 任务的最终结果 (终态才有)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "UPPERCASE")]
pub enum TaskOutcome {
    Completed(Value),
    Failed(TaskError),
    Cancelled,
}

impl TaskOutcome {
    /// 与之对应的终态
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed(_) => TaskState::Completed,
            TaskOutcome::Failed(_) => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
        }
    }

    /// 转换成 `get_result` 风格的返回值
    pub fn into_result(self, task_id: &str) -> crate::common::Result<Value> {
        match self {
            TaskOutcome::Completed(v) => Ok(v),
            TaskOutcome::Failed(error) => Err(SchedulerError::TaskFailed {
                task_id: task_id.to_string(),
                error,
            }),
            TaskOutcome::Cancelled => Err(SchedulerError::TaskCancelled(task_id.to_string())),
        }
    }
}

// ==========================================
// 5. 任务记录 (TaskRecord)
// ==========================================

/// 任务记录
///
/// - 由 `TaskStore` 独占持有，两个队列里只存 `(id, epoch)` 形式的索引。
/// - 所有状态流转都在 DashMap 的条目锁内完成，保证领取和取消不会同时成功。
pub struct TaskRecord {
    // --- 基础标识 ---
    pub(crate) id: String,
    pub(crate) name: String,

    // --- 载荷 ---
    pub(crate) handler: Arc<dyn TaskHandler>,
    pub(crate) args: Arc<TaskArgs>,

    // --- 调度控制 ---
    pub(crate) priority: TaskPriority,
    pub(crate) schedule: ScheduleType,
    /// 可被执行的最早时间 (单调时钟)
    pub(crate) scheduled_at: Instant,
    /// 提交时间 (单调时钟)，同优先级 FIFO 的依据
    pub(crate) created_at: Instant,
    /// 提交序号，`created_at` 相同时的兜底排序
    pub(crate) seq: u64,

    /// 记录代数
    ///
    /// 由 `TaskStore` 在安装时从全局计数器分配，同一个 ID 被删除后再提交也不会重复。
    /// 队列条目带着入队时的 epoch，出队时不匹配的条目直接丢弃。
    pub(crate) epoch: u64,

    // --- 状态与结果 ---
    pub(crate) state: TaskState,
    pub(crate) outcome: Option<TaskOutcome>,

    // --- 重试 ---
    pub(crate) retries: u32,
    pub(crate) max_retries: u32,
    /// 本轮 (周期任务的一次运行) 的总执行次数
    pub(crate) attempts: u32,
    pub(crate) retry_backoff: RetryBackoff,
    pub(crate) last_error: Option<TaskError>,

    // --- 周期任务 ---
    pub(crate) runs: u64,
    pub(crate) last_outcome: Option<TaskOutcome>,
    /// 运行中收到的取消请求，本轮结束后不再续期
    pub(crate) cancel_requested: bool,

    // --- 时间戳 ---
    pub(crate) submitted_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) finished_at: Option<Instant>,
}

/// 构造 `TaskRecord` 所需的参数
pub(crate) struct NewTask {
    pub id: String,
    pub name: String,
    pub handler: Arc<dyn TaskHandler>,
    pub args: TaskArgs,
    pub priority: TaskPriority,
    pub schedule: ScheduleType,
    pub max_retries: u32,
    pub retry_backoff: RetryBackoff,
    pub seq: u64,
}

impl TaskRecord {
    /// 延时或周期过大、超出单调时钟范围时返回 `InvalidInput`
    pub(crate) fn new(task: NewTask, epoch: u64, now: Instant) -> crate::common::Result<Self> {
        let scheduled_at = match task.schedule {
            ScheduleType::Once => now,
            ScheduleType::Delay(d) => TimeUtils::checked_deadline(now, d)?,
            ScheduleType::Periodic { interval } => TimeUtils::checked_deadline(now, interval)?,
        };
        let wall = TimeUtils::wall_now();
        Ok(Self {
            id: task.id,
            name: task.name,
            handler: task.handler,
            args: Arc::new(task.args),
            priority: task.priority,
            schedule: task.schedule,
            scheduled_at,
            created_at: now,
            seq: task.seq,
            epoch,
            state: TaskState::Pending,
            outcome: None,
            retries: 0,
            max_retries: task.max_retries,
            attempts: 0,
            retry_backoff: task.retry_backoff,
            last_error: None,
            runs: 0,
            last_outcome: None,
            cancel_requested: false,
            submitted_at: wall,
            updated_at: wall,
            finished_at: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// 生成队列索引条目
    pub(crate) fn queue_entry(&self) -> QueueEntry {
        QueueEntry {
            id: self.id.clone(),
            epoch: self.epoch,
            priority: self.priority,
            scheduled_at: self.scheduled_at,
            created_at: self.created_at,
            seq: self.seq,
        }
    }

    /// 条目是否仍指向本记录的当前排队实例
    pub(crate) fn accepts(&self, entry: &QueueEntry) -> bool {
        self.epoch == entry.epoch && self.state == TaskState::Pending
    }

    /// 更新最后活动时间
    pub(crate) fn touch(&mut self) {
        self.updated_at = TimeUtils::wall_now();
    }

    /// Pending -> Running
    pub(crate) fn mark_running(&mut self) {
        self.state = TaskState::Running;
        self.attempts += 1;
        self.touch();
    }

    /// 是否还能重试 (已请求取消的周期任务不再重试)
    pub(crate) fn can_retry(&self) -> bool {
        self.retries < self.max_retries && !self.cancel_requested
    }

    /// Running -> Pending (重试)，返回下次可执行时间
    pub(crate) fn mark_retry(&mut self, error: TaskError, now: Instant) -> Instant {
        self.retries += 1;
        self.last_error = Some(error);
        self.state = TaskState::Pending;
        self.scheduled_at = TimeUtils::deadline_after(now, self.retry_backoff.delay_for(self.retries));
        self.touch();
        self.scheduled_at
    }

    /// 进入终态
    pub(crate) fn finish(&mut self, outcome: TaskOutcome, now: Instant) {
        self.state = outcome.state();
        if let TaskOutcome::Failed(e) = &outcome {
            self.last_error = Some(e.clone());
        }
        if !matches!(outcome, TaskOutcome::Cancelled) {
            self.runs += 1;
            self.last_outcome = Some(outcome.clone());
        }
        self.outcome = Some(outcome);
        self.finished_at = Some(now);
        self.touch();
    }

    /// 周期任务一轮结束：记下本轮结果后回到 Pending，`interval` 后再次执行
    ///
    /// 返回 `None` 表示这不是周期任务。
    pub(crate) fn reschedule_periodic(&mut self, outcome: TaskOutcome, now: Instant) -> Option<Instant> {
        let ScheduleType::Periodic { interval } = self.schedule else {
            return None;
        };
        self.record_run(outcome);
        self.state = TaskState::Pending;
        self.retries = 0;
        self.attempts = 0;
        self.scheduled_at = TimeUtils::deadline_after(now, interval);
        self.touch();
        Some(self.scheduled_at)
    }

    /// 周期任务本轮结束时发现有取消请求：记下本轮结果，然后进入 Cancelled
    pub(crate) fn stop_periodic(&mut self, outcome: TaskOutcome, now: Instant) {
        self.record_run(outcome);
        self.finish(TaskOutcome::Cancelled, now);
    }

    fn record_run(&mut self, outcome: TaskOutcome) {
        if let TaskOutcome::Failed(e) = &outcome {
            self.last_error = Some(e.clone());
        }
        self.runs += 1;
        self.last_outcome = Some(outcome);
    }

    /// 取消
    ///
    /// - Pending: 进入 Cancelled，返回 true。
    /// - Running 的周期任务: 本轮照常跑完，之后不再续期；返回 false。
    /// - 其他: 返回 false 且不做任何改动。
    pub(crate) fn cancel(&mut self, now: Instant) -> bool {
        match self.state {
            TaskState::Pending => {
                self.finish(TaskOutcome::Cancelled, now);
                true
            }
            TaskState::Running if self.schedule.is_periodic() => {
                self.cancel_requested = true;
                self.touch();
                false
            }
            _ => false,
        }
    }

    /// 生成对外只读快照
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            priority: self.priority,
            schedule: self.schedule,
            state: self.state,
            outcome: self.outcome.clone(),
            retries: self.retries,
            max_retries: self.max_retries,
            attempts: self.attempts,
            runs: self.runs,
            last_outcome: self.last_outcome.clone(),
            last_error: self.last_error.clone(),
            cancel_requested: self.cancel_requested,
            submitted_at: self.submitted_at,
            updated_at: self.updated_at,
        }
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("schedule", &self.schedule)
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("cancel_requested", &self.cancel_requested)
            .field("retries", &self.retries)
            .field("max_retries", &self.max_retries)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

// ==========================================
// 6. 对外快照 (TaskSnapshot)
// ==========================================

/// 任务的只读快照，可直接序列化输出到日志或 API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub name: String,
    pub priority: TaskPriority,
    pub schedule: ScheduleType,
    pub state: TaskState,
    pub outcome: Option<TaskOutcome>,
    pub retries: u32,
    pub max_retries: u32,
    pub attempts: u32,
    /// 周期任务已完成的轮数 (一次性任务结束后为 1)
    pub runs: u64,
    pub last_outcome: Option<TaskOutcome>,
    pub last_error: Option<TaskError>,
    /// 周期任务运行中被请求取消，本轮结束后停止
    #[serde(default)]
    pub cancel_requested: bool,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// 7. 统计指标 (SchedulerStats)
// ==========================================

/// 调度器运行时统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// 待处理任务数 (就绪 + 延时)
    pub pending_tasks: usize,
    /// 就绪队列长度 (含尚未清理的过期条目)
    pub ready_queue_len: usize,
    /// 延时堆长度 (含尚未清理的过期条目)
    pub delayed_queue_len: usize,
    /// 运行中任务数
    pub running_tasks: usize,
    /// 成功执行计数 (累计)
    pub completed_count: u64,
    /// 最终失败计数 (累计)
    pub failed_count: u64,
    /// 取消计数 (累计)
    pub cancelled_count: u64,
    /// 重试计数 (累计)
    pub retry_count: u64,
    /// 当前存活的 Worker 数
    pub active_workers: usize,
    /// Worker 循环崩溃后被重启的次数
    pub worker_restarts: u64,
}
