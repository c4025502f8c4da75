//! # Dexhand 线协议
//!
//! 定义主机与灵巧手之间的帧格式与记录编解码：
//! - 帧头（0x55 0xAA 魔数、16 字节块长度 + 接收窗口描述字）
//! - SDO 记录（读/写请求与成功/失败应答，索引为大端序）
//! - PDO 记录（目标位置下行、实际位置/错误码上行、延迟测试）
//! - `FrameBuilder`：记录累积、CRC 占位、16 字节对齐补零与发送

use thiserror::Error;

mod frame;
mod reader;
pub mod pdo;
pub mod sdo;
pub mod wire;

pub use frame::FrameBuilder;
pub use reader::FrameReader;

/// 协议层错误
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 记录在帧内被截断
    #[error("{record} truncated: requires {required} bytes, but {remaining} remain")]
    Truncated {
        record: &'static str,
        required: usize,
        remaining: usize,
    },

    /// 未知的帧类型
    #[error("Invalid header type: 0x{0:02X}")]
    InvalidHeaderType(u8),

    /// 未知的 SDO 命令字
    #[error("Invalid SDO command specifier: 0x{0:02X}")]
    InvalidSdoControl(u8),

    /// 未知的 PDO read_id
    #[error("PDO frame invalid: read_id == 0x{0:02X}")]
    InvalidPdoReadId(u8),

    /// 单条记录超过帧容量
    #[error("Record of {0} bytes does not fit into a frame")]
    RecordTooLong(usize),

    /// SDO 数据长度必须是 1/2/4/8
    #[error("SDO data size must be 1, 2, 4, or 8 bytes, got {0}")]
    InvalidDataSize(usize),

    /// 构造帧时缓冲池已耗尽
    #[error("No transmit buffer available")]
    NoBuffer,
}
