use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::common::{Result, SchedulerError};

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// 全局统一的时间工具
///
/// - 排序、延时、超时一律使用单调时钟 (`tokio::time::Instant`)。
/// - 墙上时间 (`chrono::Utc`) 只用于日志和快照展示，绝不参与排序。
pub struct TimeUtils;

impl TimeUtils {
    /// [单调时钟] 当前时刻
    ///
    /// 使用 tokio 的 Instant，测试中可以配合 `tokio::time::pause` 控制时间。
    pub fn now() -> Instant {
        Instant::now()
    }

    /// [墙上时钟] 当前时间
    pub fn wall_now() -> DateTime<Utc> {
        Utc::now()
    }

    /// 把以秒为单位的延时转换成 `Duration`
    ///
    /// 负数、NaN、无穷大都视为非法输入，不做截断。
    pub fn delay_from_secs(secs: f64) -> Result<Duration> {
        if !secs.is_finite() {
            return Err(SchedulerError::InvalidInput(format!(
                "delay must be a finite number of seconds, got {secs}"
            )));
        }
        if secs < 0.0 {
            return Err(SchedulerError::InvalidInput(format!(
                "delay must not be negative, got {secs}s"
            )));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| SchedulerError::InvalidInput(format!("delay {secs}s out of range: {e}")))
    }

    /// `base + d`，溢出时退到约 30 年后 (足以视为 "永不到期")
    pub fn deadline_after(base: Instant, d: Duration) -> Instant {
        base.checked_add(d)
            .or_else(|| base.checked_add(FAR_FUTURE))
            .unwrap_or(base)
    }

    /// `base + d`，溢出时返回 `InvalidInput`
    pub fn checked_deadline(base: Instant, d: Duration) -> Result<Instant> {
        base.checked_add(d).ok_or_else(|| {
            SchedulerError::InvalidInput(format!("delay {d:?} is too far in the future"))
        })
    }

    /// 距离 `deadline` 还剩多久 (已过期返回 0)
    pub fn until(deadline: Instant) -> Duration {
        deadline.saturating_duration_since(Self::now())
    }
}
