//! 自校正节拍执行器
//!
//! 按 `begin + n × period` 计算每一拍的应到时刻并睡到该时刻，
//! 拍间误差不累积。节拍上下文携带起始时刻与应到时刻，供控制
//! 回路给下行帧打时间戳。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use spin_sleep::SpinSleeper;

/// 单拍上下文
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    /// 循环起始时刻
    pub begin_time: Instant,
    /// 本拍的应到时刻（非实际唤醒时刻）
    pub scheduled_tick_time: Instant,
}

impl TickContext {
    /// 自循环起始的应到微秒数（下行帧时间戳）
    pub fn scheduled_micros(&self) -> u32 {
        self.scheduled_tick_time
            .duration_since(self.begin_time)
            .as_micros() as u32
    }
}

/// 以 `rate` Hz 运行 `tick` 直至 `stop` 置位或回调返回 `false`
pub fn spin(rate: f64, stop: &AtomicBool, mut tick: impl FnMut(&TickContext) -> bool) {
    let period = Duration::from_secs_f64(1.0 / rate);
    let sleeper = SpinSleeper::default();
    let begin = Instant::now();
    let mut n: u32 = 0;

    loop {
        // Acquire: 观察到停止标志时，请求方先前的写入已可见
        if stop.load(Ordering::Acquire) {
            break;
        }

        let scheduled = begin + period * n;
        let now = Instant::now();
        if scheduled > now {
            sleeper.sleep(scheduled - now);
        }

        let context = TickContext {
            begin_time: begin,
            scheduled_tick_time: scheduled,
        };
        if !tick(&context) {
            break;
        }
        n = n.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_until_callback_stops() {
        let stop = AtomicBool::new(false);
        let mut count = 0;
        spin(1000.0, &stop, |_| {
            count += 1;
            count < 5
        });
        assert_eq!(count, 5);
    }

    #[test]
    fn test_stop_flag_breaks_loop() {
        let stop = AtomicBool::new(true);
        let mut count = 0;
        spin(1000.0, &stop, |_| {
            count += 1;
            true
        });
        assert_eq!(count, 0);
    }

    #[test]
    fn test_scheduled_micros_follows_period() {
        let stop = AtomicBool::new(false);
        let mut stamps = Vec::new();
        spin(1000.0, &stop, |ctx| {
            stamps.push(ctx.scheduled_micros());
            stamps.len() < 4
        });
        // 1 kHz → 应到时刻每拍推进 1000 µs
        assert_eq!(stamps, vec![0, 1000, 2000, 3000]);
    }

    #[test]
    fn test_wall_clock_pacing() {
        let stop = AtomicBool::new(false);
        let start = Instant::now();
        let mut count = 0;
        spin(200.0, &stop, |_| {
            count += 1;
            count < 10
        });
        // 10 拍 @200Hz ≈ 45ms 应到时刻跨度
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
