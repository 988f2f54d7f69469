use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tokio::time::Instant;

use super::QueueEntry;

/// 延时堆中的排序包装
///
/// `BinaryHeap` 是最大堆，这里把比较反过来，让堆顶是：
/// 1. `scheduled_at` 最早的
/// 2. 同一时刻优先级最高的
/// 3. 再按提交顺序 (`created_at`, `seq`)
#[derive(Debug)]
struct DelayItem(QueueEntry);

impl Ord for DelayItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .scheduled_at
            .cmp(&self.0.scheduled_at)
            .then_with(|| self.0.priority.cmp(&other.0.priority))
            .then_with(|| other.0.created_at.cmp(&self.0.created_at))
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

impl PartialOrd for DelayItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DelayItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DelayItem {}

/// 延时堆 (最小堆，按可执行时间升序)
///
/// 纯数据结构，不加锁，由 `TaskStore` 负责互斥。
#[derive(Debug, Default)]
pub struct DelayHeap {
    heap: BinaryHeap<DelayItem>,
}

impl DelayHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一个条目，O(log n)
    ///
    /// 返回 `true` 表示新条目成为了堆顶 (最早到期)，调用方据此决定是否唤醒晋升循环。
    pub fn insert(&mut self, entry: QueueEntry) -> bool {
        let at = entry.scheduled_at;
        let becomes_head = self.next_due().is_none_or(|head| at < head);
        self.heap.push(DelayItem(entry));
        becomes_head
    }

    /// 弹出所有 `scheduled_at <= now` 的条目，按堆序返回
    pub fn pop_due(&mut self, now: Instant) -> Vec<QueueEntry> {
        let mut due = Vec::new();
        while self
            .heap
            .peek()
            .is_some_and(|item| item.0.scheduled_at <= now)
        {
            if let Some(DelayItem(entry)) = self.heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    /// 堆顶条目的到期时间
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|item| item.0.scheduled_at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
