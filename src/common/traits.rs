use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ==========================================
// 1. 任务参数 (TaskArgs)
// ==========================================

/// 任务参数：位置参数 + 关键字参数
///
/// 值统一用 `serde_json::Value` 承载，回调里按需反序列化成具体类型。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个位置参数
    pub fn arg(mut self, value: impl Serialize) -> Self {
        self.args.push(to_value(value));
        self
    }

    /// 设置一个关键字参数
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.kwargs.insert(key.into(), to_value(value));
        self
    }

    /// 读取第 `index` 个位置参数并转换成 `T`
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        let raw = self
            .args
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("missing positional argument #{index}"))?;
        serde_json::from_value(raw.clone())
            .map_err(|e| anyhow::anyhow!("argument #{index} has wrong type: {e}"))
    }

    /// 读取关键字参数，不存在时返回 `None`
    pub fn get_kw<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.kwargs.get(key) {
            None => Ok(None),
            Some(raw) => serde_json::from_value(raw.clone())
                .map(Some)
                .map_err(|e| anyhow::anyhow!("keyword argument '{key}' has wrong type: {e}")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

fn to_value(value: impl Serialize) -> Value {
    // 参数序列化失败 (例如 map 的 key 不是字符串) 时退化为 Null，回调读取时会得到类型错误
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ==========================================
// 2. 核心任务接口 (TaskHandler)
// ==========================================

/// 可调度的工作单元
///
/// - 回调是同步的，调度器会把它放到阻塞线程池里执行，Worker 等待其返回。
/// - 返回 `Ok(value)`: 任务成功，`value` 存为结果。
/// - 返回 `Err(e)`: 任务失败，调度器按 `max_retries` 决定重试还是标记失败。
/// - panic 会被捕获并按失败处理，不会影响 Worker。
///
/// 任何 `Fn(&TaskArgs) -> anyhow::Result<Value>` 闭包都自动实现了本 Trait。
pub trait TaskHandler: Send + Sync + 'static {
    fn call(&self, args: &TaskArgs) -> anyhow::Result<Value>;
}

impl<F> TaskHandler for F
where
    F: Fn(&TaskArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn call(&self, args: &TaskArgs) -> anyhow::Result<Value> {
        self(args)
    }
}

/// 把具体的 handler 装箱成调度器内部使用的共享句柄
pub fn into_handler<H: TaskHandler>(handler: H) -> Arc<dyn TaskHandler> {
    Arc::new(handler)
}
