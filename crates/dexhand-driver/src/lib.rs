//! # Dexhand 协议处理器
//!
//! 驱动核心：在单一 bulk 端点对上复用 SDO 请求/应答与 PDO 实时流。
//!
//! - **对象存储**：扁平的 64 字节对齐单元数组，按 (索引, 子索引)
//!   查找，每单元一个无锁请求/应答状态机；
//! - **SDO 引擎**：199 Hz 扫描推进状态机、处理超时、写后回读确认；
//! - **PDO 引擎**：500 Hz 控制循环，下行目标位置、上行实际位置与
//!   错误码，错误位按沿变逐位记录；
//! - **直通 SDO**：四个槽位的任意对象同步读写（诊断用途）；
//! - **实时控制器**：可分离的滤波控制器，低通滤波为参考实现。

use thiserror::Error;

pub mod clock;
mod controller;
mod filter;
mod handler;
mod latency;
mod raw_sdo;
mod receive;
mod storage;
mod sweep;
mod tick;
mod value;

pub use controller::{FilteredController, FilteredControllerBridge, JointPositions, RealtimeController};
pub use filter::{Filter, LowPass, LowPassUnit};
pub use handler::{Handler, PDO_UPDATE_RATE};
pub use raw_sdo::RAW_SDO_SLOT_COUNT;
pub use storage::{Mode, Operation, State, StorageInfo, policy};
pub use sweep::SDO_UPDATE_RATE;
pub use tick::{TickContext, spin as tick_spin};
pub use value::{AtomicF64, Completion, Context8, Value8, WireValue};

use dexhand_protocol::ProtocolError;
use dexhand_usb::TransportError;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议层错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 操作在截止时刻前未完成
    #[error("{0}")]
    Timeout(String),

    /// 参数错误（形状、宽度、越界下标）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 逻辑违例（重复附着、未附着即分离等），同步抛出
    #[error("{0}")]
    Logic(&'static str),

    /// 直通槽耗尽
    #[error("No available raw SDO slot. Too many concurrent operations.")]
    NoRawSlot,

    /// 跨线程调用公开操作
    #[error(
        "Thread safety violation: \n\
         Operation must be called from the construction thread by default. \n\
         If you want to perform operations in multiple threads, call \n\
         disable_thread_safe_check() and use a mutex to ensure that ONLY \n\
         ONE THREAD is operating at the same time."
    )]
    ThreadAffinity,
}

impl DriverError {
    /// 是否为超时错误
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout(_))
    }
}
