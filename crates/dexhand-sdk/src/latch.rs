//! 同步闭锁
//!
//! 公开表面的同步调用阻塞在闭锁上：每发起一个异步操作计数加一，
//! 扫描线程的完成回调计数减一；任一操作失败都会在 `wait` 时以
//! 超时错误表面化。

use parking_lot::{Condvar, Mutex};

use dexhand_driver::Context8;

use crate::HandError;

#[derive(Default)]
struct LatchState {
    remaining: usize,
    failed: usize,
}

/// 计数闭锁（计数器 + 条件变量）
///
/// 回调侧经由 8 字节上下文携带 `*const Latch`；调用方必须在闭锁
/// 等待结束之前保持其存活（公开表面的同步包装保证这一点）。
pub struct Latch {
    state: Mutex<LatchState>,
    completed: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LatchState::default()),
            completed: Condvar::new(),
        }
    }

    pub fn count_up(&self) {
        self.state.lock().remaining += 1;
    }

    pub fn count_down(&self, success: bool) {
        let mut state = self.state.lock();
        state.remaining -= 1;
        if !success {
            state.failed += 1;
        }
        if state.remaining == 0 {
            self.completed.notify_all();
        }
    }

    /// 阻塞至全部操作完成；任一失败返回超时错误
    pub fn wait(&self) -> Result<(), HandError> {
        let mut state = self.state.lock();
        while state.remaining > 0 {
            self.completed.wait(&mut state);
        }
        if state.failed > 0 {
            return Err(HandError::Timeout);
        }
        Ok(())
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

/// 驱动层完成回调：上下文即 `*const Latch`
pub(crate) fn latch_completion(context: Context8, success: bool) {
    let latch: *const Latch = context.as_ptr();
    unsafe { (*latch).count_down(success) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_wait_returns_when_all_succeed() {
        let latch = Arc::new(Latch::new());
        latch.count_up();
        latch.count_up();

        let worker = {
            let latch = Arc::clone(&latch);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                latch.count_down(true);
                latch.count_down(true);
            })
        };

        assert!(latch.wait().is_ok());
        worker.join().unwrap();
    }

    #[test]
    fn test_any_failure_surfaces_as_timeout() {
        let latch = Latch::new();
        latch.count_up();
        latch.count_up();
        latch.count_down(true);
        latch.count_down(false);
        assert!(matches!(latch.wait(), Err(HandError::Timeout)));
    }

    #[test]
    fn test_empty_latch_returns_immediately() {
        let latch = Latch::new();
        assert!(latch.wait().is_ok());
    }
}
