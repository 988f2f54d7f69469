use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::QueueEntry;
use crate::common::TimeUtils;

/// 就绪队列中的排序包装
///
/// 最大堆堆顶：优先级最高；同优先级下 `created_at` 最早，再按 `seq`。
#[derive(Debug)]
struct ReadyItem(QueueEntry);

impl Ord for ReadyItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.created_at.cmp(&self.0.created_at))
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

impl PartialOrd for ReadyItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReadyItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReadyItem {}

/// 就绪队列
///
/// - 高优先级永远先出队，与到达顺序无关；同优先级严格 FIFO。
/// - `pop_blocking` 供 Worker 使用：队列为空时挂起，直到有新任务、超时或停机。
#[derive(Debug, Default)]
pub struct ReadyQueue {
    heap: Mutex<BinaryHeap<ReadyItem>>,
    /// 入队信号
    ///
    /// 每次 push 调用一次 `notify_one`：有等待者就唤醒一个，没有就留下一个许可，
    /// 所以"检查队列为空"和"开始等待"之间到达的任务不会被漏掉。
    notify: Notify,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队，O(log n)
    pub fn push(&self, entry: QueueEntry) {
        self.heap.lock().push(ReadyItem(entry));
        self.notify.notify_one();
    }

    /// 批量入队：一次加锁，Worker 醒来时能看到整批条目
    pub fn push_many(&self, entries: Vec<QueueEntry>) {
        let count = entries.len();
        if count == 0 {
            return;
        }
        self.heap.lock().extend(entries.into_iter().map(ReadyItem));
        for _ in 0..count {
            self.notify.notify_one();
        }
    }

    /// 非阻塞出队
    pub fn try_pop(&self) -> Option<QueueEntry> {
        self.heap.lock().pop().map(|item| item.0)
    }

    /// 阻塞出队
    ///
    /// # 返回值
    /// - `Some(entry)`: 拿到了任务。
    /// - `None`: 等待 `timeout` 后仍为空，或收到停机信号。
    ///   停机时即使队列里还有任务也返回 `None`，剩余任务保持 Pending。
    pub async fn pop_blocking(
        &self,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Option<QueueEntry> {
        let deadline = TimeUtils::deadline_after(Instant::now(), timeout);
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            if let Some(entry) = self.try_pop() {
                return Some(entry);
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = self.notify.notified() => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    return if shutdown.is_cancelled() { None } else { self.try_pop() };
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}
