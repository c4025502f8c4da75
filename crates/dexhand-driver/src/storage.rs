//! 对象存储单元
//!
//! 每个字典对象对应一个 64 字节对齐的存储单元，内含打包的原子
//! 操作字（模式 + 状态）、原子值槽、单调版本号与截止时刻。
//!
//! # 跨线程字段所有权
//!
//! - `operation` 是唯一的同步点：公开线程只做 NONE→WAITING（release
//!   发布），清回 NONE 由扫描线程以 release 完成；
//! - `timeout` / `deadline` / `callback` / `callback_context` 仅在
//!   持有方（mode == NONE 时的公开线程、mode != NONE 时的扫描线程）
//!   访问，经 `operation` 的 acquire/release 传递可见性；
//! - `info` 在 `start_transmit_receive` 之前写入一次，此后只读；
//! - `version` 仅由扫描/接收路径写（release），读方 acquire 后读
//!   `value` 可得到一致快照。

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::value::{Completion, Context8, Value8};

/// 对象策略位
pub mod policy {
    /// 屏蔽：操作直接短路为成功，不产生任何线上流量
    pub const MASKED: u32 = 1 << 0;
    /// 控制字：布尔语义编码为线上 1（使能）/ 5（清障并失能）
    pub const CONTROL_WORD: u32 = 1 << 1;
    /// 位置：弧度 ↔ 满量程 int32
    pub const POSITION: u32 = 1 << 2;
    /// 反向位置：在 POSITION 基础上双向取负
    pub const POSITION_REVERSED: u32 = 1 << 3;
    pub const VELOCITY: u32 = 1 << 4;
    pub const VELOCITY_REVERSED: u32 = 1 << 5;
    /// 主机心跳看门狗单元：由扫描线程周期性重发写入
    pub const HOST_HEARTBEAT: u32 = 1 << 6;
    /// 力矩限幅：线上 u16 毫安 ↔ 对外 f64 安培
    pub const EFFORT_LIMIT: u32 = 1 << 7;
}

/// 对象元信息（索引、子索引、线上宽度、策略位）
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    pub index: u16,
    pub sub_index: u8,
    /// 线上宽度：1 / 2 / 4 / 8
    pub size: u8,
    pub policy: u32,
}

impl StorageInfo {
    pub const fn new(index: u16, sub_index: u8, size: u8, policy: u32) -> Self {
        Self {
            index,
            sub_index,
            size,
            policy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Mode {
    None = 0,
    Read = 1,
    Write = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum State {
    Success = 0,
    Waiting = 1,
    Reading = 2,
    Writing = 3,
    WritingConfirming = 4,
}

/// 打包进单个原子字的操作（模式 + 状态）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub mode: Mode,
    pub state: State,
}

impl Operation {
    pub const IDLE: Operation = Operation {
        mode: Mode::None,
        state: State::Success,
    };

    fn to_bits(self) -> u32 {
        ((self.mode as u32) << 16) | self.state as u32
    }

    fn from_bits(bits: u32) -> Self {
        let mode = match bits >> 16 {
            1 => Mode::Read,
            2 => Mode::Write,
            _ => Mode::None,
        };
        let state = match bits & 0xFFFF {
            1 => State::Waiting,
            2 => State::Reading,
            3 => State::Writing,
            4 => State::WritingConfirming,
            _ => State::Success,
        };
        Operation { mode, state }
    }
}

/// 按线上宽度取低位比较掩码（写确认用）
pub(crate) fn value_mask(size: u8) -> u64 {
    match size {
        1 => 0xFF,
        2 => 0xFFFF,
        4 => 0xFFFF_FFFF,
        _ => u64::MAX,
    }
}

/// 弧度 → 满量程 int32（先钳位再四舍五入）
pub(crate) fn to_raw_position(angle: f64) -> i32 {
    const SCALE: f64 = i32::MAX as f64 / std::f64::consts::TAU;
    (angle * SCALE)
        .clamp(i32::MIN as f64, i32::MAX as f64)
        .round() as i32
}

/// 满量程 int32 → 弧度
pub(crate) fn extract_raw_position(raw: i32) -> f64 {
    const SCALE: f64 = std::f64::consts::TAU / i32::MAX as f64;
    raw as f64 * SCALE
}

/// 64 字节对齐的存储单元
#[repr(align(64))]
pub struct StorageCell {
    info: Cell<StorageInfo>,
    operation: AtomicU32,
    version: AtomicU32,
    value: AtomicU64,
    timeout_nanos: Cell<i64>,
    deadline_nanos: Cell<u64>,
    callback: Cell<Option<Completion>>,
    callback_context: Cell<Context8>,
}

const _: () = assert!(std::mem::size_of::<StorageCell>() == 64);

// 安全性：Cell 字段的访问遵循模块级注释描述的所有权协议，
// 跨线程可见性由 `operation` 的 acquire/release 承载。
unsafe impl Sync for StorageCell {}

impl Default for StorageCell {
    fn default() -> Self {
        Self {
            info: Cell::new(StorageInfo::default()),
            operation: AtomicU32::new(Operation::IDLE.to_bits()),
            version: AtomicU32::new(0),
            value: AtomicU64::new(0),
            timeout_nanos: Cell::new(0),
            deadline_nanos: Cell::new(0),
            callback: Cell::new(None),
            callback_context: Cell::new(Context8::default()),
        }
    }
}

impl StorageCell {
    pub fn info(&self) -> StorageInfo {
        self.info.get()
    }

    /// 仅限构造阶段调用（index map 冻结前）
    pub(crate) fn set_info(&self, info: StorageInfo) {
        self.info.set(info);
    }

    pub fn operation(&self, ordering: Ordering) -> Operation {
        Operation::from_bits(self.operation.load(ordering))
    }

    pub(crate) fn store_operation(&self, operation: Operation, ordering: Ordering) {
        self.operation.store(operation.to_bits(), ordering);
    }

    /// 版本号：每次成功读完成单调递增；0 保留为「从未更新」，
    /// 回绕时跳过。
    pub fn version(&self, ordering: Ordering) -> u32 {
        self.version.load(ordering)
    }

    /// 递增版本号（回绕跳 0），release 发布
    pub(crate) fn bump_version(&self) {
        let mut next = self.version.load(Ordering::Relaxed).wrapping_add(1);
        if next == 0 {
            next = 1;
        }
        self.version.store(next, Ordering::Release);
    }

    pub(crate) fn raw_value(&self, ordering: Ordering) -> u64 {
        self.value.load(ordering)
    }

    pub(crate) fn store_raw_value(&self, raw: u64, ordering: Ordering) {
        self.value.store(raw, ordering);
    }

    pub(crate) fn timeout_nanos(&self) -> i64 {
        self.timeout_nanos.get()
    }

    pub(crate) fn deadline_nanos(&self) -> u64 {
        self.deadline_nanos.get()
    }

    pub(crate) fn set_deadline_nanos(&self, deadline: u64) {
        self.deadline_nanos.set(deadline);
    }

    /// 摘取回调（扫描线程在清回 NONE 前调用）
    pub(crate) fn take_callback(&self) -> (Option<Completion>, Context8) {
        (self.callback.get(), self.callback_context.get())
    }

    /// 公开线程发布一次操作：填好参数后以 release 置入 WAITING
    pub(crate) fn arm(
        &self,
        mode: Mode,
        timeout_nanos: i64,
        callback: Option<Completion>,
        context: Context8,
    ) {
        self.timeout_nanos.set(timeout_nanos);
        self.callback.set(callback);
        self.callback_context.set(context);
        self.store_operation(
            Operation {
                mode,
                state: State::Waiting,
            },
            Ordering::Release,
        );
    }

    /// 按策略翻译并存入调用方值
    pub(crate) fn store_data(&self, data: Value8) {
        let info = self.info.get();
        let raw = if info.policy & policy::CONTROL_WORD != 0 {
            if data.get::<bool>() { 1u64 } else { 5u64 }
        } else if info.policy & policy::POSITION != 0 {
            let mut raw = to_raw_position(data.get::<f64>());
            if info.policy & policy::POSITION_REVERSED != 0 {
                raw = -raw;
            }
            (raw as u32) as u64
        } else if info.policy & policy::EFFORT_LIMIT != 0 {
            let milliamps = (data.get::<f64>() * 1000.0).round().clamp(0.0, u16::MAX as f64);
            milliamps as u64
        } else {
            data.bits()
        };
        self.value.store(raw, Ordering::Relaxed);
    }

    /// 按策略翻译并取出当前值
    pub(crate) fn load_data(&self) -> Value8 {
        let info = self.info.get();
        let raw = self.value.load(Ordering::Relaxed);

        if info.policy & policy::CONTROL_WORD != 0 {
            Value8::new(raw as u16 == 1)
        } else if info.policy & policy::POSITION != 0 {
            let mut value = extract_raw_position(raw as u32 as i32);
            if info.policy & policy::POSITION_REVERSED != 0 {
                value = -value;
            }
            Value8::new(value)
        } else if info.policy & policy::EFFORT_LIMIT != 0 {
            Value8::new(raw as u16 as f64 / 1000.0)
        } else {
            Value8::from_bits(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn cell_with_policy(size: u8, policy_bits: u32) -> StorageCell {
        let cell = StorageCell::default();
        cell.set_info(StorageInfo::new(0x0064, 0, size, policy_bits));
        cell
    }

    #[test]
    fn test_operation_bits_roundtrip() {
        for mode in [Mode::None, Mode::Read, Mode::Write] {
            for state in [
                State::Success,
                State::Waiting,
                State::Reading,
                State::Writing,
                State::WritingConfirming,
            ] {
                let operation = Operation { mode, state };
                assert_eq!(Operation::from_bits(operation.to_bits()), operation);
            }
        }
    }

    #[test]
    fn test_position_translation_law() {
        // 往返误差上界：|θ' − θ| ≤ π / INT32_MAX
        let tolerance = PI / i32::MAX as f64;
        for theta in [-PI, -PI / 2.0, -0.001, 0.0, 0.5, PI / 2.0, PI] {
            let raw = to_raw_position(theta);
            let back = extract_raw_position(raw);
            assert!(
                (back - theta).abs() <= tolerance,
                "theta={theta}, back={back}"
            );
        }
    }

    #[test]
    fn test_position_encoding_matches_constant() {
        let k = i32::MAX as f64 / std::f64::consts::TAU;
        for theta in [0.25f64, -1.2, 3.0] {
            assert_eq!(to_raw_position(theta), (theta * k).round() as i32);
        }
    }

    #[test]
    fn test_position_clamps_at_full_scale() {
        assert_eq!(to_raw_position(100.0), i32::MAX);
        assert_eq!(to_raw_position(-100.0), i32::MIN);
    }

    #[test]
    fn test_control_word_translation() {
        let cell = cell_with_policy(2, policy::CONTROL_WORD);

        cell.store_data(Value8::new(true));
        assert_eq!(cell.raw_value(Ordering::Relaxed), 1);
        assert_eq!(cell.load_data().get::<bool>(), true);

        cell.store_data(Value8::new(false));
        assert_eq!(cell.raw_value(Ordering::Relaxed), 5);
        assert_eq!(cell.load_data().get::<bool>(), false);

        // 线上读回非 1 的任何值都视为 false
        cell.store_raw_value(7, Ordering::Relaxed);
        assert_eq!(cell.load_data().get::<bool>(), false);
    }

    #[test]
    fn test_position_reversed_translation() {
        let cell = cell_with_policy(4, policy::POSITION | policy::POSITION_REVERSED);

        cell.store_data(Value8::new(PI / 2.0));
        let raw = cell.raw_value(Ordering::Relaxed) as u32 as i32;
        assert_eq!(raw, -to_raw_position(PI / 2.0));

        // 双向取负：读回原值
        let back = cell.load_data().get::<f64>();
        assert!((back - PI / 2.0).abs() <= PI / i32::MAX as f64);
    }

    #[test]
    fn test_effort_limit_translation() {
        let cell = cell_with_policy(2, policy::EFFORT_LIMIT);

        cell.store_data(Value8::new(1.5f64));
        assert_eq!(cell.raw_value(Ordering::Relaxed), 1500);
        assert_eq!(cell.load_data().get::<f64>(), 1.5);

        // 超量程钳位到 u16
        cell.store_data(Value8::new(1e6));
        assert_eq!(cell.raw_value(Ordering::Relaxed), u16::MAX as u64);
    }

    #[test]
    fn test_version_bump_skips_zero() {
        let cell = StorageCell::default();
        cell.bump_version();
        assert_eq!(cell.version(Ordering::Relaxed), 1);

        // 回绕：u32::MAX + 1 → 跳过保留值 0
        cell.version.store(u32::MAX, Ordering::Relaxed);
        cell.bump_version();
        assert_eq!(cell.version(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_value_mask() {
        assert_eq!(value_mask(1), 0xFF);
        assert_eq!(value_mask(2), 0xFFFF);
        assert_eq!(value_mask(4), 0xFFFF_FFFF);
        assert_eq!(value_mask(8), u64::MAX);
    }
}
