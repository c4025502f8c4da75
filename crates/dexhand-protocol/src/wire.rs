//! 帧级常量与帧头编解码
//!
//! 所有多字节字段均为小端序，唯独对象索引与帧头描述字按大端序上线。

use crate::{FrameReader, ProtocolError};

/// 帧头魔数
pub const FRAME_MAGIC: [u8; 2] = [0x55, 0xAA];
/// 主机端地址
pub const SOURCE_HOST: u8 = 0x00;
/// 设备端地址
pub const DESTINATION_HAND: u8 = 0xA0;

/// SDO 帧类型
pub const FRAME_TYPE_SDO: u8 = 0x21;
/// PDO 帧类型
pub const FRAME_TYPE_PDO: u8 = 0x11;

/// 帧尾 CRC 占位长度（值由设备侧忽略，恒为 0）
pub const CRC_SIZE: usize = 2;
/// 帧长度对齐粒度
pub const FRAME_ALIGNMENT: usize = 16;

/// 通告给设备的最大接收窗口（16 字节块数）
pub const MAX_RECEIVE_WINDOW: u16 = 0x100;

/// 帧头：`{0x55 0xAA, source, destination, 描述字(BE), type, 0x00}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: u8,
    /// 帧长度（16 字节块数）
    pub blocks: u16,
    pub max_receive_window: u16,
}

impl FrameHeader {
    pub const WIRE_SIZE: usize = 8;

    /// 描述字：低 10 位为接收窗口，高 6 位为（块数 − 1）
    fn description(&self) -> u16 {
        debug_assert!(self.blocks >= 1 && self.blocks <= 64);
        self.max_receive_window | ((self.blocks - 1) << 10)
    }

    pub fn pack(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0..2].copy_from_slice(&FRAME_MAGIC);
        buf[2] = SOURCE_HOST;
        buf[3] = DESTINATION_HAND;
        buf[4..6].copy_from_slice(&self.description().to_be_bytes());
        buf[6] = self.frame_type;
        buf[7] = 0x00;
        buf
    }

    pub fn parse(reader: &mut FrameReader<'_>) -> Result<Self, ProtocolError> {
        let bytes = reader.take::<8>("FrameHeader")?;
        let description = u16::from_be_bytes([bytes[4], bytes[5]]);
        Ok(Self {
            frame_type: bytes[6],
            blocks: (description >> 10) + 1,
            max_receive_window: description & 0x03FF,
        })
    }
}
