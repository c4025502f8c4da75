//! # Dexhand SDK
//!
//! 五指二十关节灵巧手的主机侧 SDK。
//!
//! 设备以 USB bulk 端点对暴露一个类 CANopen 对象字典；本 SDK 提供
//! 手 / 手指 / 关节三层类型化访问、500 Hz 实时位置流与可分离的
//! 滤波控制器。
//!
//! ```no_run
//! use dexhand_sdk::{Hand, HandOptions, data, DEFAULT_TIMEOUT};
//!
//! # fn main() -> Result<(), dexhand_sdk::HandError> {
//! let hand = Hand::open(HandOptions::default())?;
//!
//! let temperature = hand.read::<data::hand::Temperature>(DEFAULT_TIMEOUT)?;
//! println!("hand temperature: {temperature:.1} C");
//!
//! // 使能全部关节并读取拇指末端关节位置
//! hand.write_joint::<data::joint::Enabled>(true, DEFAULT_TIMEOUT)?;
//! let joint = hand.finger_thumb().joint(3)?;
//! let position = joint.read::<data::joint::ActualPosition>(DEFAULT_TIMEOUT)?;
//! println!("thumb J4: {position:.4} rad");
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod data;
mod finger;
mod hand;
mod joint;
mod latch;
mod realtime;
mod version;

pub use finger::Finger;
pub use hand::{DEFAULT_TIMEOUT, Features, Hand, HandOptions};
pub use joint::Joint;
pub use latch::Latch;
pub use realtime::{LowPass, RealtimeHandle};
pub use version::FirmwareVersion;

pub use dexhand_driver::{Filter, JointPositions, RealtimeController};
pub use dexhand_usb::{Transport, UsbTransport};

use dexhand_driver::DriverError;
use dexhand_usb::TransportError;

/// SDK 错误类型
#[derive(Error, Debug)]
pub enum HandError {
    /// 操作在截止时刻前未完成
    #[error("Operation timed out")]
    Timeout,

    /// 初始化序列超时（关节配置未完成）
    #[error("Hand initialization timed out: joint configuration incomplete")]
    InitializationTimeout,

    /// 手固件版本过旧（< 3.0.0）
    #[error(
        "The firmware version ({0}) is outdated. \
         Please contact after-sales service for an upgrade."
    )]
    FirmwareIncompatible(String),

    /// 手指/关节下标越界
    #[error("Index out of bounds! Possible values: {0}.")]
    IndexOutOfBounds(&'static str),

    /// 上行未开启时读取实际位置
    #[error("Upstream is disabled.")]
    UpstreamDisabled,

    /// 驱动层错误
    #[error(transparent)]
    Driver(DriverError),

    /// 传输层错误
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<DriverError> for HandError {
    fn from(error: DriverError) -> Self {
        match error {
            DriverError::Timeout(_) => HandError::Timeout,
            other => HandError::Driver(other),
        }
    }
}

impl HandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HandError::Timeout | HandError::InitializationTimeout)
    }
}
