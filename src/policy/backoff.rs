use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::calculate_backoff;

/// 失败重试的排队策略
///
/// - 决定一次失败之后，任务多久才能再次被领取。
/// - 只影响重试，不影响首次执行和周期任务的间隔。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryBackoff {
    /// 立即重新进入就绪队列 (默认)
    ///
    /// 重试沿用原始提交时间排序，因此会排在同优先级后提交的任务前面。
    #[default]
    Immediate,

    /// 固定间隔后再次执行
    Fixed(Duration),

    /// 指数退避 + 全抖动
    ///
    /// 第 n 次重试在 `[0, min(base * 2^(n-1), max)]` 之间随机取值。
    /// 用于下游服务故障时打散重试，避免所有任务同一时刻一起冲上去。
    Exponential { base: Duration, max: Duration },
}

impl RetryBackoff {
    /// 创建指数退避策略
    ///
    /// # 参数
    /// - `base_ms`: 首次重试的等待上限
    /// - `max_ms`: 封顶值
    pub fn exponential(base_ms: u64, max_ms: u64) -> Self {
        Self::Exponential {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms.max(base_ms)),
        }
    }

    pub fn fixed(millis: u64) -> Self {
        Self::Fixed(Duration::from_millis(millis))
    }

    /// 第 `retry` 次重试 (从 1 开始) 前需要等待的时长
    pub fn delay_for(&self, retry: u32) -> Duration {
        match *self {
            RetryBackoff::Immediate => Duration::ZERO,
            RetryBackoff::Fixed(d) => d,
            RetryBackoff::Exponential { base, max } => calculate_backoff(retry, base, max),
        }
    }
}
