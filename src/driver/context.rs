use crate::{common::config::SchedulerConfig, driver::DriverMetrics, store::TaskStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 驱动器上下文 (Driver Context)
///
/// **职责**:
/// 打包 Driver、晋升循环和门面共享的全局资源，避免在函数调用时传递一长串参数。
/// 每个 `Scheduler` 实例各自持有一份，互不共享。
#[derive(Debug, Clone)]
pub struct DriverContext {
    // --- 核心组件 (Components) ---
    /// 任务仓库 (记录 + 两个队列)
    pub store: Arc<TaskStore>,

    /// 全局配置
    pub config: Arc<SchedulerConfig>,

    /// 全局统计指标
    pub metrics: Arc<DriverMetrics>,

    // --- 信号与控制 (Signals & Control) ---
    /// 关机信号
    pub shutdown: CancellationToken,
}

impl DriverContext {
    /// 创建一个新的驱动器上下文
    pub fn new(config: SchedulerConfig, shutdown_token: CancellationToken) -> Self {
        Self {
            store: Arc::new(TaskStore::new()),
            config: Arc::new(config),
            metrics: Arc::new(DriverMetrics::default()),
            shutdown: shutdown_token,
        }
    }

    /// 检查是否收到停机信号
    ///
    /// 用于在循环中快速判断是否应该退出。
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
