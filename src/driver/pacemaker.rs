use tokio::time::Instant;
use tracing::{debug, trace};

use crate::common::TimeUtils;
use crate::driver::context::DriverContext;

/// 任务起搏器 (晋升循环)
///
/// 核心职责：
/// 1. 把延时堆中到期的任务搬进就绪队列。
/// 2. 按 `retention.sweep_interval` 清理过期的终态记录。
///
/// 睡眠时长取 `min(promotion_tick, 下一个到期时间, 下一次清理时间)`；
/// 有更早到期的任务入堆时通过 `delay_changed` 被提前唤醒。
/// 停机后退出，不会把剩余延时任务提前放出来。
pub struct TaskPacemaker {
    ctx: DriverContext,
}

impl TaskPacemaker {
    pub fn new(ctx: DriverContext) -> Self {
        Self { ctx }
    }

    pub async fn run(self) {
        let store = &self.ctx.store;
        let tick = self.ctx.config.promotion_tick();
        let retention = &self.ctx.config.retention;
        let sweep_every = retention.sweep_interval();
        let mut next_sweep = TimeUtils::deadline_after(TimeUtils::now(), sweep_every);

        trace!("[Pacemaker] Started, tick = {:?}", tick);
        loop {
            if self.ctx.is_shutdown() {
                break;
            }

            let now = TimeUtils::now();
            let promoted = store.promote_due(now);
            if promoted > 0 {
                trace!("[Pacemaker] Promoted {} delayed tasks", promoted);
            }

            if now >= next_sweep {
                let removed = store.sweep(retention, now);
                if removed > 0 {
                    debug!("[Pacemaker] Retention sweep removed {} finished tasks", removed);
                }
                next_sweep = TimeUtils::deadline_after(now, sweep_every);
            }

            let tick_at = TimeUtils::deadline_after(now, tick);
            let wake = next_wake(tick_at, store.next_due(), next_sweep);
            tokio::select! {
                biased;
                _ = self.ctx.shutdown.cancelled() => break,
                _ = store.delay_changed.notified() => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
        trace!("[Pacemaker] Stopped");
    }
}

/// 三个候选唤醒时间中最早的一个
fn next_wake(tick_at: Instant, next_due: Option<Instant>, next_sweep: Instant) -> Instant {
    let wake = tick_at.min(next_sweep);
    match next_due {
        Some(due) => wake.min(due),
        None => wake,
    }
}
