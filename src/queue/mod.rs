//! 两级任务队列
//!
//! - [`DelayHeap`]: 按可执行时间排序的最小堆，存放尚未到期的任务。
//! - [`ReadyQueue`]: 按优先级排序的就绪队列，Worker 从这里领取任务。
//!
//! 两个队列都只保存 [`QueueEntry`] 索引，任务本体在 `TaskStore` 里。

pub mod delay;
pub mod ready;

pub use delay::DelayHeap;
pub use ready::ReadyQueue;

use tokio::time::Instant;

use crate::common::TaskPriority;

/// 队列索引条目
///
/// 排序所需的字段在入队时从任务记录里拷贝一份，出队后再回到 `TaskStore`
/// 用 `(id, epoch)` 校验该条目是否仍然有效。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: String,
    pub epoch: u64,
    pub priority: TaskPriority,
    pub scheduled_at: Instant,
    pub created_at: Instant,
    pub seq: u64,
}
