use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::common::{TaskArgs, TaskHandler, exponential_delay};

/// 调度器之外的通用重试工具
///
/// 与任务自身的 `max_retries` 无关：这里在同一次执行内部原地重试，
/// 适合包裹一段不稳定的调用 (网络请求等)，或直接包裹整个回调。
///
/// 第 n 次失败后 (n 从 0 开始) 等待 `min(backoff_factor * 2^n, max_delay)`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 总尝试次数 (含第一次)，至少为 1
    pub max_attempts: u32,
    pub backoff_factor: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_factor: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff_factor,
            max_delay,
        }
    }

    /// 第 `failures` 次失败之后的等待时长 (`failures` 从 0 开始)
    pub fn delay_after(&self, failures: u32) -> Duration {
        exponential_delay(failures.saturating_add(1), self.backoff_factor, self.max_delay)
    }

    /// 同步执行 `op`，失败时阻塞等待后重试，返回最后一次的结果
    ///
    /// 会阻塞当前线程，只应在任务回调 (阻塞线程池) 或普通线程中使用。
    pub fn run<T, E, F>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut failures = 0;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if failures + 1 >= attempts => {
                    warn!(
                        "[Retry] Attempt {}/{} failed, giving up: {}",
                        failures + 1,
                        attempts,
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_after(failures);
                    warn!(
                        "[Retry] Attempt {}/{} failed: {}. Retrying in {:?}",
                        failures + 1,
                        attempts,
                        e,
                        delay
                    );
                    std::thread::sleep(delay);
                    failures += 1;
                }
            }
        }
    }

    /// 把一个回调包装成自带原地重试的回调
    pub fn wrap<H: TaskHandler>(&self, handler: H) -> Retrying<H> {
        Retrying {
            policy: self.clone(),
            inner: handler,
        }
    }
}

/// [`RetryPolicy::wrap`] 的产物
pub struct Retrying<H> {
    policy: RetryPolicy,
    inner: H,
}

impl<H: TaskHandler> TaskHandler for Retrying<H> {
    fn call(&self, args: &TaskArgs) -> anyhow::Result<Value> {
        self.policy.run(|| self.inner.call(args))
    }
}
