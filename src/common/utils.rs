use nanoid::nanoid;
use rand::Rng;
use std::time::Duration;

// ==========================================
// 1. ID 生成工具 (Identity Utilities)
// ==========================================

/// 生成全局唯一的任务 ID (NanoID)
///
/// - 长度: 21 字符
/// - 字符集: 0-9a-zA-Z (不含 `-` 和 `_`，方便双击选中)
#[inline]
pub fn new_task_id() -> String {
    const ALPHABET: [char; 62] = [
        '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h',
        'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
        'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
        'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
    ];
    nanoid!(21, &ALPHABET)
}

// ==========================================
// 2. 算法工具 (Algorithmic Utilities)
// ==========================================

/// 指数退避的上限值 (不含抖动)
///
/// `min(base * 2^(attempt-1), max)`，`attempt` 从 1 开始。
pub fn exponential_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(30) as i32;
    let secs = base.as_secs_f64() * 2f64.powi(exponent);
    if secs >= max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(secs)
    }
}

/// 计算指数退避时间 (Exponential Backoff with Full Jitter)
///
/// 在 `[0, exponential_delay]` 之间随机取值，最少 1ms。
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let ceiling = exponential_delay(attempt, base, max).as_secs_f64();
    if ceiling <= 0.0 {
        return Duration::ZERO;
    }
    let mut rng = rand::rng();
    let jittered = rng.random_range(0.0..=ceiling);
    Duration::from_secs_f64(jittered.max(0.001))
}
