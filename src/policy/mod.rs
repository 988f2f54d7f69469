//! 重试策略
//!
//! - [`RetryBackoff`]: 调度器内部使用，决定失败任务重新排队的时间。
//! - [`RetryPolicy`]: 独立的原地重试工具，可以包裹任意闭包或回调。

pub mod backoff;
pub mod retry;

pub use backoff::RetryBackoff;
pub use retry::{RetryPolicy, Retrying};
