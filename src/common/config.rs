use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::{Result, SchedulerError};

// ==========================================
// 1. 资源配置 (WorkerConfig)
// ==========================================

/// Worker 池配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 工作单元数
    ///
    /// - 说明: 同时执行任务回调的最大数量，构造后固定，不支持动态伸缩。
    /// - 默认值: 4
    pub workers: usize,

    /// 就绪队列等待超时 (毫秒)
    ///
    /// - 说明: Worker 在空队列上阻塞的最长时间，超时后重新检查停机信号。
    /// - 默认值: 1000
    /// - 影响: 停机信号本身会立即唤醒 Worker，这里只是兜底。
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 1000,
        }
    }
}

// ==========================================
// 2. 策略配置 (PolicyConfig)
// ==========================================

/// 调度节奏与停机配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// 延时任务晋升周期上限 (毫秒)
    ///
    /// - 说明: 晋升循环最多睡这么久就会醒来检查一次延时堆。
    ///   有更早到期的任务入堆时会被立即唤醒，所以这只是最坏情况下的延迟。
    /// - 默认值: 1000
    pub promotion_tick_ms: u64,

    /// 优雅停机超时 (秒)
    ///
    /// - 说明: `stop(true)` 等待所有 Worker 退出的最长时间。
    ///   正在执行的回调无法被打断，超过该时间后 `stop` 返回错误。
    /// - 默认值: 0，表示一直等到所有 Worker 退出。
    pub shutdown_timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            promotion_tick_ms: 1000,
            shutdown_timeout_secs: 0,
        }
    }
}

// ==========================================
// 3. 保留策略 (RetentionConfig)
// ==========================================

/// 终态任务记录的保留策略
///
/// 长时间运行的服务里，已结束的任务记录不能无限堆积。
/// Pending / Running 的记录永远不会被清理。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// 终态记录的最长保留时间 (秒)。0 表示不按时间清理。
    ///
    /// - 默认值: 3600
    pub finished_ttl_secs: u64,

    /// 终态记录的最大保留数量。0 表示不按数量清理。
    ///
    /// - 默认值: 10,000 (超出后最早结束的先被删除)
    pub max_finished: usize,

    /// 清理间隔 (秒)
    ///
    /// - 默认值: 30
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            finished_ttl_secs: 3600,
            max_finished: 10_000,
            sweep_interval_secs: 30,
        }
    }
}

impl RetentionConfig {
    /// 不做任何自动清理 (记录保留到调度器销毁或手动 `cleanup`)
    pub fn keep_all() -> Self {
        Self {
            finished_ttl_secs: 0,
            max_finished: 0,
            sweep_interval_secs: 30,
        }
    }

    pub fn finished_ttl(&self) -> Option<Duration> {
        (self.finished_ttl_secs > 0).then(|| Duration::from_secs(self.finished_ttl_secs))
    }

    pub fn max_finished(&self) -> Option<usize> {
        (self.max_finished > 0).then_some(self.max_finished)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

// ==========================================
// 4. 总配置入口 (SchedulerConfig)
// ==========================================

/// 调度器总配置
///
/// 使用分层结构组织配置项。支持 `serde` 序列化，可直接从 JSON 加载，
/// 缺省字段取默认值。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 资源与并发
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 节奏与停机
    #[serde(default)]
    pub policy: PolicyConfig,

    /// 终态记录保留
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl SchedulerConfig {
    /// 从 JSON 字符串加载并校验
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 快速创建一个测试友好的配置：晋升和轮询更快，停机超时更短
    pub fn new_dev() -> Self {
        let mut cfg = Self::default();
        cfg.worker.poll_interval_ms = 100;
        cfg.policy.promotion_tick_ms = 50;
        cfg.policy.shutdown_timeout_secs = 5;
        cfg
    }

    /// 参数校验
    pub fn validate(&self) -> Result<()> {
        if self.worker.workers == 0 {
            return Err(SchedulerError::Config(
                "worker.workers must be at least 1".into(),
            ));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(SchedulerError::Config(
                "worker.poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.policy.promotion_tick_ms == 0 {
            return Err(SchedulerError::Config(
                "policy.promotion_tick_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }

    pub fn promotion_tick(&self) -> Duration {
        Duration::from_millis(self.policy.promotion_tick_ms)
    }

    /// `None` 表示不设上限
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        (self.policy.shutdown_timeout_secs > 0)
            .then(|| Duration::from_secs(self.policy.shutdown_timeout_secs))
    }
}
