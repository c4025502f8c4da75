//! 可插拔滤波能力与参考实现（一阶低通）
//!
//! 滤波单元的收件箱与输出都是原子槽：调用方线程投递目标值，
//! PDO 线程按采样节拍推进，互不加锁。

use std::sync::atomic::Ordering;

use crate::value::AtomicF64;

/// 每关节滤波能力
///
/// `Unit` 为单关节状态；所有方法以共享引用操作，线程安全由
/// 实现方的原子槽保证。
pub trait Filter: Send + Sync + 'static {
    type Unit: Send + Sync;

    /// 以初始值创建一个关节单元
    fn make_unit(&self, initial: f64) -> Self::Unit;

    /// 通告采样频率（附着实时控制器时调用一次）
    fn setup(&self, sampling_freq: f64);

    /// 投递新的目标值（调用方线程）
    fn input(&self, unit: &Self::Unit, value: f64);

    /// 推进一个采样并返回滤波输出（PDO 线程）
    fn step(&self, unit: &Self::Unit) -> f64;
}

/// 一阶低通滤波
pub struct LowPass {
    cutoff_freq: f64,
    alpha: AtomicF64,
}

/// 低通滤波的单关节状态
pub struct LowPassUnit {
    inbox: AtomicF64,
    output: AtomicF64,
}

impl LowPass {
    pub fn new(cutoff_freq: f64) -> Self {
        Self {
            cutoff_freq,
            alpha: AtomicF64::new(1.0),
        }
    }

    pub fn cutoff_freq(&self) -> f64 {
        self.cutoff_freq
    }

    pub fn calculate_alpha(cutoff_freq: f64, sampling_freq: f64) -> f64 {
        let dt = 1.0 / sampling_freq;
        let rc = 1.0 / (std::f64::consts::TAU * cutoff_freq);
        dt / (dt + rc)
    }
}

impl Filter for LowPass {
    type Unit = LowPassUnit;

    fn make_unit(&self, initial: f64) -> LowPassUnit {
        LowPassUnit {
            inbox: AtomicF64::new(initial),
            output: AtomicF64::new(initial),
        }
    }

    fn setup(&self, sampling_freq: f64) {
        self.alpha.store(
            Self::calculate_alpha(self.cutoff_freq, sampling_freq),
            Ordering::Relaxed,
        );
    }

    fn input(&self, unit: &LowPassUnit, value: f64) {
        unit.inbox.store(value, Ordering::Relaxed);
    }

    fn step(&self, unit: &LowPassUnit) -> f64 {
        let alpha = self.alpha.load(Ordering::Relaxed);
        let x = unit.inbox.load(Ordering::Relaxed);
        let output = alpha * x + (1.0 - alpha) * unit.output.load(Ordering::Relaxed);
        unit.output.store(output, Ordering::Relaxed);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_formula() {
        // fc = 10Hz, fs = 500Hz → dt = 2ms, rc ≈ 15.9ms
        let alpha = LowPass::calculate_alpha(10.0, 500.0);
        assert!((alpha - 0.111634).abs() < 1e-5);
    }

    #[test]
    fn test_step_converges_to_input() {
        let filter = LowPass::new(10.0);
        filter.setup(500.0);
        let unit = filter.make_unit(0.0);

        filter.input(&unit, 1.0);
        let mut output = 0.0;
        for _ in 0..2000 {
            output = filter.step(&unit);
        }
        assert!((output - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_step_is_monotone_towards_target() {
        let filter = LowPass::new(5.0);
        filter.setup(500.0);
        let unit = filter.make_unit(0.0);
        filter.input(&unit, 1.0);

        let a = filter.step(&unit);
        let b = filter.step(&unit);
        let c = filter.step(&unit);
        assert!(0.0 < a && a < b && b < c && c < 1.0);
    }

    #[test]
    fn test_unit_starts_at_initial() {
        let filter = LowPass::new(10.0);
        filter.setup(500.0);
        let unit = filter.make_unit(0.7);
        // 未投递新目标时输出保持初始值
        assert!((filter.step(&unit) - 0.7).abs() < 1e-12);
    }
}
