pub mod config;
pub mod error;
pub mod model;
pub mod time;
pub mod traits;
pub(crate) mod utils;

// 导出配置
pub use config::{PolicyConfig, RetentionConfig, SchedulerConfig, WorkerConfig};

// 导出错误类型
pub use error::{Result, SchedulerError};

// 导出核心模型
pub use model::{
    ScheduleType, SchedulerStats, TaskError, TaskOutcome, TaskPriority, TaskRecord, TaskSnapshot,
    TaskState,
};

// 导出用户需实现的 Trait
pub use traits::{TaskArgs, TaskHandler, into_handler};

pub use time::TimeUtils;
// 内部工具的快捷访问
pub(crate) use utils::{calculate_backoff, exponential_delay, new_task_id};
