//! 实时控制器抽象与滤波控制器
//!
//! PDO 引擎每个节拍调用一次 `step`：传入实际位置快照（上行开启时），
//! 返回本拍要下发的目标位置。滤波控制器把调用方投递的目标经滤波
//! 单元整形后下发，双向变体另维护一份实际位置镜像供外部读取。

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::filter::Filter;
use crate::value::AtomicF64;

/// 手指 × 关节位置组
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct JointPositions {
    pub value: [[f64; 4]; 5],
}

/// PDO 引擎的实时控制回调
///
/// `step` 运行在 500 Hz 热路径上，实现方不得阻塞或分配。
pub trait RealtimeController: Send {
    /// 通告循环频率（附着后、首拍前调用一次）
    fn setup(&mut self, frequency: f64);

    /// 推进一拍：`actual` 在上行开启时为最新实际位置快照
    fn step(&mut self, actual: Option<&JointPositions>) -> JointPositions;
}

/// 滤波实时控制器
///
/// 目标值经由每关节原子收件箱进入（调用方线程），PDO 线程按拍
/// 推进滤波单元。`upstream` 开启时同时维护实际位置镜像。
pub struct FilteredController<F: Filter> {
    filter: F,
    units: [[F::Unit; 4]; 5],
    actual: Option<[[AtomicF64; 4]; 5]>,
}

impl<F: Filter> FilteredController<F> {
    pub fn new(initial: &[[f64; 4]; 5], filter: F, upstream: bool) -> Arc<Self> {
        let units = std::array::from_fn(|i| std::array::from_fn(|j| filter.make_unit(initial[i][j])));
        let actual = upstream.then(|| {
            std::array::from_fn(|i| std::array::from_fn(|j| AtomicF64::new(initial[i][j])))
        });
        Arc::new(Self {
            filter,
            units,
            actual,
        })
    }

    /// 投递目标位置（调用方线程）
    pub fn set(&self, positions: &[[f64; 4]; 5]) {
        for i in 0..5 {
            for j in 0..4 {
                self.filter.input(&self.units[i][j], positions[i][j]);
            }
        }
    }

    /// 实际位置镜像（仅双向变体）
    pub fn actual(&self) -> Option<&[[AtomicF64; 4]; 5]> {
        self.actual.as_ref()
    }
}

/// 把共享的滤波控制器桥接进 PDO 线程
///
/// 控制器本体经 `Arc` 同时被调用方句柄（`set` / `actual`）和
/// PDO 线程（`step`）持有。
pub struct FilteredControllerBridge<F: Filter>(pub Arc<FilteredController<F>>);

impl<F: Filter> RealtimeController for FilteredControllerBridge<F> {
    fn setup(&mut self, frequency: f64) {
        self.0.filter.setup(frequency);
    }

    fn step(&mut self, actual: Option<&JointPositions>) -> JointPositions {
        let inner = &*self.0;

        if let (Some(mirror), Some(actual)) = (inner.actual.as_ref(), actual) {
            for i in 0..5 {
                for j in 0..4 {
                    mirror[i][j].store(actual.value[i][j], Ordering::Relaxed);
                }
            }
        }

        let mut result = JointPositions::default();
        for i in 0..5 {
            for j in 0..4 {
                result.value[i][j] = inner.filter.step(&inner.units[i][j]);
            }
        }
        result
    }
}
