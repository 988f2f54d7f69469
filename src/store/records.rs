use std::time::Duration;

use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::TaskStore;
use crate::common::model::NewTask;
use crate::common::{
    RetentionConfig, Result, SchedulerError, TaskOutcome, TaskRecord, TaskSnapshot, TaskState,
    TimeUtils,
};

impl TaskStore {
    // ==========================================
    // 1. 写入 (Insert / Cancel)
    // ==========================================

    /// 安装一条新记录并排队，返回任务 ID
    ///
    /// - ID 不存在: 直接插入。
    /// - ID 对应的记录已是终态: 替换旧记录，旧记录残留的队列条目全部失效。
    /// - ID 对应的记录仍未结束: `InvalidInput`。
    ///
    /// 每条新记录都从全局计数器取 epoch，即使旧记录已被删除，残留条目也匹配不上。
    pub(crate) fn insert(&self, task: NewTask, now: Instant) -> Result<String> {
        let id = task.id.clone();
        let entry = match self.data.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let old = occupied.get();
                if !old.state.is_terminal() {
                    return Err(SchedulerError::InvalidInput(format!(
                        "task id {id} is already in use by a {:?} task",
                        old.state
                    )));
                }
                let record = TaskRecord::new(task, self.next_epoch(), now)?;
                let entry = record.queue_entry();
                occupied.insert(record);
                entry
            }
            Entry::Vacant(vacant) => {
                let record = TaskRecord::new(task, self.next_epoch(), now)?;
                let entry = record.queue_entry();
                vacant.insert(record);
                entry
            }
        };
        self.enqueue(entry, now);
        Ok(id)
    }

    /// 取消 (Pending -> Cancelled)
    ///
    /// 返回 `true` 当且仅当记录原本是 Pending。队列里的残留条目在出队时被跳过。
    /// 运行中的周期任务返回 `false`，但会记下取消请求，本轮结束后不再续期。
    pub(crate) fn cancel(&self, id: &str, now: Instant) -> Result<bool> {
        let cancelled = {
            let mut record = self
                .data
                .get_mut(id)
                .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;
            record.cancel(now)
        };
        if cancelled {
            self.finished.notify_waiters();
        }
        Ok(cancelled)
    }

    // ==========================================
    // 2. 查询 (Query)
    // ==========================================

    pub fn state(&self, id: &str) -> Result<TaskState> {
        self.data
            .get(id)
            .map(|r| r.state)
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    pub fn snapshot(&self, id: &str) -> Result<TaskSnapshot> {
        self.data
            .get(id)
            .map(|r| r.snapshot())
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    /// 终态结果，未结束时为 `None`
    pub fn outcome(&self, id: &str) -> Result<Option<TaskOutcome>> {
        self.data
            .get(id)
            .map(|r| r.outcome.clone())
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    /// 等待任务进入终态
    ///
    /// 先注册通知再检查状态，检查与等待之间发生的状态变化不会丢失。
    /// `timeout = None` 表示一直等。`Some(ZERO)` 只检查一次。
    pub async fn wait_outcome(&self, id: &str, timeout: Option<Duration>) -> Result<TaskOutcome> {
        let started = Instant::now();
        let deadline = timeout.map(|t| TimeUtils::deadline_after(started, t));
        loop {
            let notified = self.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.outcome(id)? {
                return Ok(outcome);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(SchedulerError::Timeout {
                            task_id: id.to_string(),
                            waited: started.elapsed(),
                        });
                    }
                }
                None => notified.await,
            }
        }
    }

    // ==========================================
    // 3. 保留策略 (Retention)
    // ==========================================

    /// 按保留策略清理终态记录，返回删除数量
    ///
    /// 先删超过 TTL 的，再按结束时间从旧到新删掉超出数量上限的部分。
    pub(crate) fn sweep(&self, retention: &RetentionConfig, now: Instant) -> usize {
        let mut removed = 0;

        if let Some(ttl) = retention.finished_ttl() {
            let expired: Vec<String> = self
                .data
                .iter()
                .filter(|r| r.finished_at.is_some_and(|at| now.saturating_duration_since(at) >= ttl))
                .map(|r| r.id.clone())
                .collect();
            for id in expired {
                if self.remove_finished(&id) {
                    removed += 1;
                }
            }
        }

        if let Some(max) = retention.max_finished() {
            let mut finished: Vec<(Instant, String)> = self
                .data
                .iter()
                .filter(|r| r.state.is_terminal())
                .filter_map(|r| r.finished_at.map(|at| (at, r.id.clone())))
                .collect();
            if finished.len() > max {
                finished.sort();
                let excess = finished.len() - max;
                for (_, id) in finished.into_iter().take(excess) {
                    if self.remove_finished(&id) {
                        removed += 1;
                    }
                }
            }
        }

        removed
    }

    /// 删除全部终态记录，返回删除数量
    pub(crate) fn cleanup(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, r| !r.state.is_terminal());
        before.saturating_sub(self.data.len())
    }

    /// 删除一条终态记录
    ///
    /// 未结束的记录不能删除 (`InvalidInput`)。
    pub(crate) fn purge(&self, id: &str) -> Result<()> {
        match self.data.remove_if(id, |_, r| r.state.is_terminal()) {
            Some(_) => Ok(()),
            None => match self.data.get(id) {
                Some(r) => Err(SchedulerError::InvalidInput(format!(
                    "task {id} is {:?} and cannot be purged",
                    r.state
                ))),
                None => Err(SchedulerError::TaskNotFound(id.to_string())),
            },
        }
    }

    /// 条件删除：只有终态记录才会被删掉
    fn remove_finished(&self, id: &str) -> bool {
        self.data
            .remove_if(id, |_, r| r.state.is_terminal())
            .is_some()
    }
}
