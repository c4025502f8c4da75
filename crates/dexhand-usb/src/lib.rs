//! # Dexhand USB 传输层
//!
//! 提供灵巧手 USB bulk 设备的传输抽象：
//! - 设备扫描与独占（VID / 可选 PID / 可选序列号）
//! - 可复用发送缓冲池（64 × 2048 字节）
//! - 后台 TX/RX 线程与接收回调

use thiserror::Error;

mod pool;
mod usb;

pub use pool::{BufferPool, TransmitBuffer};
pub use usb::UsbTransport;

/// 单次 bulk 传输的最大长度（字节）
pub const MAX_TRANSFER_LENGTH: usize = 2048;

/// 发送缓冲池大小
pub const TRANSMIT_BUFFER_COUNT: usize = 64;
/// 接收缓冲数量
pub const RECEIVE_BUFFER_COUNT: usize = 4;

/// 接收回调：每个完整的 IN 传输调用一次
pub type ReceiveCallback = Box<dyn FnMut(&[u8]) + Send>;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// 设备选择失败（未找到或歧义匹配）
    #[error("Device selection failed: {0}")]
    DeviceSelection(String),

    /// 发送长度超过 `MAX_TRANSFER_LENGTH`
    #[error("Transmit size {size} exceeds maximum transfer length {max}")]
    TransmitTooLong { size: usize, max: usize },

    /// `receive` 只允许订阅一次
    #[error("Receive callback can only be subscribed once")]
    AlreadySubscribed,

    /// 传输层已关闭
    #[error("Transport is shut down")]
    Closed,
}

/// 传输抽象：协议层只依赖该 trait，便于用 Mock 注入测试
pub trait Transport: Send + Sync {
    /// 从缓冲池取出一块发送缓冲；池空时返回 `None`，任意线程可调用，不阻塞
    fn request_transmit_buffer(&self) -> Option<TransmitBuffer>;

    /// 提交发送。缓冲在传输完成后自动归还缓冲池。
    fn transmit(&self, buffer: TransmitBuffer, size: usize) -> Result<(), TransportError>;

    /// 订阅接收回调（只能调用一次）。每个完成的 IN 传输触发一次回调，
    /// 随后缓冲自动重新提交。
    fn receive(&self, callback: ReceiveCallback) -> Result<(), TransportError>;
}
