//! 8 字节类型擦除值槽
//!
//! 对象存储的值槽统一为 64 位原始位型；公开表面的类型化读写经由
//! [`WireValue`] 在位型与业务类型之间转换。完成回调的上下文同样被
//! 限制为 8 字节平凡拷贝（热路径零分配约束）。

use std::sync::atomic::{AtomicU64, Ordering};

/// 可存入值槽的线上类型
///
/// 约定：整数零扩展到 64 位，浮点取 IEEE 位型，布尔为 0/1。
pub trait WireValue: Copy {
    fn to_bits64(self) -> u64;
    fn from_bits64(bits: u64) -> Self;
}

impl WireValue for u8 {
    fn to_bits64(self) -> u64 {
        self as u64
    }
    fn from_bits64(bits: u64) -> Self {
        bits as u8
    }
}

impl WireValue for u16 {
    fn to_bits64(self) -> u64 {
        self as u64
    }
    fn from_bits64(bits: u64) -> Self {
        bits as u16
    }
}

impl WireValue for u32 {
    fn to_bits64(self) -> u64 {
        self as u64
    }
    fn from_bits64(bits: u64) -> Self {
        bits as u32
    }
}

impl WireValue for u64 {
    fn to_bits64(self) -> u64 {
        self
    }
    fn from_bits64(bits: u64) -> Self {
        bits
    }
}

impl WireValue for i32 {
    fn to_bits64(self) -> u64 {
        self as u32 as u64
    }
    fn from_bits64(bits: u64) -> Self {
        bits as u32 as i32
    }
}

impl WireValue for f32 {
    fn to_bits64(self) -> u64 {
        self.to_bits() as u64
    }
    fn from_bits64(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
}

impl WireValue for f64 {
    fn to_bits64(self) -> u64 {
        self.to_bits()
    }
    fn from_bits64(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

impl WireValue for bool {
    fn to_bits64(self) -> u64 {
        self as u64
    }
    fn from_bits64(bits: u64) -> Self {
        bits != 0
    }
}

/// 8 字节类型擦除值
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Value8(u64);

impl Value8 {
    pub fn new<T: WireValue>(value: T) -> Self {
        Self(value.to_bits64())
    }

    pub fn get<T: WireValue>(self) -> T {
        T::from_bits64(self.0)
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }
}

/// 完成回调上下文：8 字节平凡拷贝
///
/// 需要更多状态的调用方自行分配并传入指针。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Context8(pub u64);

impl Context8 {
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    pub fn as_ptr<T>(self) -> *const T {
        self.0 as usize as *const T
    }
}

/// 完成回调：`(上下文, 是否成功)`
pub type Completion = fn(Context8, bool);

/// 无锁的 `f64` 槽（IEEE 位型存于 `AtomicU64`）
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.0.load(ordering))
    }

    pub fn store(&self, value: f64, ordering: Ordering) {
        self.0.store(value.to_bits(), ordering);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}
