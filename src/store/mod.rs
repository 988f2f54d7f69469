//! 任务仓库 (Task Store)
//!
//! 进程内唯一的任务数据源：
//! - `data`: 全量任务记录，ID -> [`TaskRecord`]，DashMap 分片锁。
//! - `delayed` / `ready`: 两个只存索引 (`QueueEntry`) 的队列。
//!
//! 锁顺序：持有 map 条目锁时可以操作队列，持有队列锁时绝不回头访问 map。

mod queue;
mod records;

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::common::{TaskRecord, TaskState};
use crate::queue::{DelayHeap, ReadyQueue};

pub use queue::{Claimed, Settled};

#[derive(Debug, Default)]
pub struct TaskStore {
    /// 【数据仓库】ID -> 任务记录
    pub(crate) data: DashMap<String, TaskRecord>,

    /// 【延时索引】尚未到期的任务
    pub(crate) delayed: Mutex<DelayHeap>,

    /// 【就绪索引】Worker 从这里领取
    pub(crate) ready: ReadyQueue,

    /// 延时堆堆顶变更信号，唤醒晋升循环重新计算睡眠时长
    pub(crate) delay_changed: Notify,

    /// 任务进入终态的广播信号，`wait_outcome` 在上面等待
    pub(crate) finished: Notify,

    /// 提交序号
    seq: AtomicU64,

    /// 记录代数分配器，全局单调递增，删除后复用同一个 ID 也不会撞上旧条目
    epochs: AtomicU64,
}

/// 按状态统计的记录数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StateCounts {
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一个提交序号 (单调递增)
    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// 下一个记录代数
    pub(crate) fn next_epoch(&self) -> u64 {
        self.epochs.fetch_add(1, Ordering::Relaxed)
    }

    /// 记录总数 (含终态)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn delayed_len(&self) -> usize {
        self.delayed.lock().len()
    }

    /// 遍历全表统计各状态数量
    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for r in self.data.iter() {
            match r.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}
