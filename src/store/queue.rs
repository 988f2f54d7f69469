use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;

use super::TaskStore;
use crate::common::{TaskArgs, TaskError, TaskHandler, TaskOutcome, TaskRecord, TaskState};
use crate::queue::QueueEntry;

/// 领取成功后交给 Worker 的执行凭证
///
/// `epoch` 是栅栏令牌：回写结果时必须与记录当前的 epoch 一致。
pub struct Claimed {
    pub id: String,
    pub name: String,
    pub epoch: u64,
    pub attempt: u32,
    pub handler: Arc<dyn TaskHandler>,
    pub args: Arc<TaskArgs>,
}

impl std::fmt::Debug for Claimed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Claimed")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("epoch", &self.epoch)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// 一次执行回写后的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// 成功，进入终态
    Completed,
    /// 失败，已重新排队 (`retry` 从 1 开始)
    Retrying { retry: u32, at: Instant },
    /// 重试耗尽，进入终态
    Failed,
    /// 周期任务本轮结束，`at` 时再次执行；`failed` 表示本轮以失败告终
    Rescheduled { at: Instant, failed: bool },
    /// 周期任务本轮结束，运行期间收到了取消请求，进入 Cancelled
    Stopped { failed: bool },
    /// 记录已被替换或删除，结果被丢弃
    Discarded,
}

impl TaskStore {
    /// 把一个 Pending 条目放进合适的队列
    ///
    /// 已到期的直接进就绪队列，否则进延时堆；成为堆顶时唤醒晋升循环。
    pub(crate) fn enqueue(&self, entry: QueueEntry, now: Instant) {
        if entry.scheduled_at <= now {
            self.ready.push(entry);
            return;
        }
        let new_head = self.delayed.lock().insert(entry);
        if new_head {
            self.delay_changed.notify_one();
        }
    }

    /// 独占领取 (Pending -> Running)
    ///
    /// 在 map 条目锁内校验 epoch 和状态，与 `cancel` 互斥。
    /// 过期条目 (记录已取消、已被替换或已删除) 返回 `None`。
    pub(crate) fn claim(&self, entry: &QueueEntry) -> Option<Claimed> {
        let mut record = self.data.get_mut(&entry.id)?;
        if !record.accepts(entry) {
            return None;
        }
        record.mark_running();
        Some(Claimed {
            id: record.id.clone(),
            name: record.name.clone(),
            epoch: record.epoch,
            attempt: record.attempts,
            handler: record.handler.clone(),
            args: record.args.clone(),
        })
    }

    /// 回写一次执行结果
    ///
    /// - 成功: 终态 Completed；周期任务回到 Pending。
    /// - 失败且还能重试: 回到 Pending 并按退避策略重新排队。
    /// - 失败且重试耗尽: 终态 Failed；周期任务回到 Pending。
    ///
    /// `reschedule = false` 时 (停机中) 周期任务也直接进入终态。
    /// 运行中被请求取消的周期任务不再重试，本轮结束后进入 Cancelled。
    pub(crate) fn settle(
        &self,
        claimed: &Claimed,
        result: Result<Value, TaskError>,
        reschedule: bool,
        now: Instant,
    ) -> Settled {
        let (settled, requeue) = {
            let Some(mut record) = self.data.get_mut(&claimed.id) else {
                return Settled::Discarded;
            };
            if record.epoch != claimed.epoch || record.state != TaskState::Running {
                return Settled::Discarded;
            }

            match result {
                Ok(value) => {
                    conclude(&mut record, TaskOutcome::Completed(value), reschedule, now)
                }
                Err(error) if record.can_retry() => {
                    let at = record.mark_retry(error, now);
                    let retry = record.retries;
                    (Settled::Retrying { retry, at }, Some(record.queue_entry()))
                }
                Err(error) => conclude(&mut record, TaskOutcome::Failed(error), reschedule, now),
            }
        };

        // map 条目锁已释放
        match requeue {
            Some(entry) => self.enqueue(entry, now),
            None => self.finished.notify_waiters(),
        }
        settled
    }

    /// 把所有到期的延时条目晋升到就绪队列，返回晋升数量
    ///
    /// 先在堆锁内批量弹出，释放后再逐个确认记录仍处于对应的 Pending 实例。
    pub(crate) fn promote_due(&self, now: Instant) -> usize {
        let due = self.delayed.lock().pop_due(now);
        let live: Vec<QueueEntry> = due
            .into_iter()
            .filter(|entry| {
                self.data
                    .get(&entry.id)
                    .is_some_and(|record| record.accepts(entry))
            })
            .collect();
        let promoted = live.len();
        self.ready.push_many(live);
        promoted
    }

    /// 延时堆中最早的到期时间
    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.delayed.lock().next_due()
    }
}

/// 一轮运行得出最终结果：周期任务回到 Pending，其余进入终态
fn conclude(
    record: &mut TaskRecord,
    outcome: TaskOutcome,
    reschedule: bool,
    now: Instant,
) -> (Settled, Option<QueueEntry>) {
    let failed = matches!(outcome, TaskOutcome::Failed(_));
    if record.cancel_requested {
        record.stop_periodic(outcome, now);
        return (Settled::Stopped { failed }, None);
    }
    if reschedule && record.schedule.is_periodic() {
        if let Some(at) = record.reschedule_periodic(outcome.clone(), now) {
            return (Settled::Rescheduled { at, failed }, Some(record.queue_entry()));
        }
    }
    let settled = if failed {
        Settled::Failed
    } else {
        Settled::Completed
    };
    record.finish(outcome, now);
    (settled, None)
}
