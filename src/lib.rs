// 1. 基础模块
pub mod common;

// 2. 数据结构与存储
pub mod queue;
pub mod store;

// 3. 核心引擎与策略
pub mod driver;
pub mod policy;

// 4. 调度器门面
pub mod scheduler;

pub use common::{
    RetentionConfig, Result, ScheduleType, SchedulerConfig, SchedulerError, SchedulerStats,
    TaskArgs, TaskError, TaskHandler, TaskOutcome, TaskPriority, TaskSnapshot, TaskState,
};
pub use policy::{RetryBackoff, RetryPolicy};
pub use scheduler::{Scheduler, SchedulerBuilder, SubmitOptions};
