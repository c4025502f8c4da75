//! 进程启动锚定的单调时钟
//!
//! 以首次访问的 `Instant` 为零点，返回纳秒计数。单调、不受系统
//! 时钟调整影响，可安全存入原子变量（截止时刻、心跳间隔都用它）。

use std::sync::OnceLock;
use std::time::Instant;

static APP_START: OnceLock<Instant> = OnceLock::new();

/// 距进程锚点的单调纳秒数
pub fn monotonic_nanos() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

/// 永不超时的截止时刻
pub const DEADLINE_NEVER: u64 = u64::MAX;

/// 由超时长度计算截止时刻
///
/// 负的超时或相加溢出都视为「永不超时」。
pub fn deadline_after(now_nanos: u64, timeout_nanos: i64) -> u64 {
    if timeout_nanos < 0 {
        return DEADLINE_NEVER;
    }
    now_nanos
        .checked_add(timeout_nanos as u64)
        .unwrap_or(DEADLINE_NEVER)
}

/// 秒（浮点）转超时纳秒；NaN、负数或溢出都归一化为「永不超时」（-1）
pub fn timeout_nanos_from_secs(secs: f64) -> i64 {
    if !(secs >= 0.0) {
        // NaN 或负数
        return -1;
    }
    let nanos = secs * 1e9;
    if nanos >= i64::MAX as f64 {
        return -1;
    }
    nanos as i64
}
