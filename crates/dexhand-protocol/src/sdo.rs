//! SDO 记录编解码
//!
//! 记录头统一为 `{control, 大端索引, 子索引}`，写请求与读应答的
//! 命令字按负载宽度区分（1/2/4/8 字节）。

use crate::{FrameReader, ProtocolError};

/// 读请求
pub const READ_REQUEST: u8 = 0x30;
/// 读失败应答（附 4 字节错误码）
pub const READ_ERROR: u8 = 0x33;
/// 写成功应答
pub const WRITE_SUCCESS: u8 = 0x21;
/// 写失败应答（附 4 字节错误码）
pub const WRITE_ERROR: u8 = 0x23;
/// 填充字节：停止解析
pub const PADDING: u8 = 0x00;

/// 记录头长度：control + 大端索引 + 子索引
pub const RECORD_HEADER_SIZE: usize = 4;
/// 读请求记录长度
pub const READ_REQUEST_SIZE: usize = RECORD_HEADER_SIZE;

/// 写请求命令字（按负载宽度）
pub fn write_control(size: usize) -> Result<u8, ProtocolError> {
    match size {
        1 => Ok(0x20),
        2 => Ok(0x22),
        4 => Ok(0x24),
        8 => Ok(0x28),
        other => Err(ProtocolError::InvalidDataSize(other)),
    }
}

/// 读成功命令字对应的负载宽度
fn read_success_size(control: u8) -> Option<usize> {
    match control {
        0x35 => Some(1),
        0x37 => Some(2),
        0x39 => Some(4),
        0x3D => Some(8),
        _ => None,
    }
}

/// 写请求记录长度
pub fn write_request_size(size: usize) -> usize {
    RECORD_HEADER_SIZE + size
}

/// 编码读请求到 `buf`（须恰好 `READ_REQUEST_SIZE` 字节）
pub fn encode_read(buf: &mut [u8], index: u16, sub_index: u8) {
    debug_assert_eq!(buf.len(), READ_REQUEST_SIZE);
    buf[0] = READ_REQUEST;
    buf[1..3].copy_from_slice(&index.to_be_bytes());
    buf[3] = sub_index;
}

/// 编码写请求到 `buf`（须恰好 `write_request_size(size)` 字节）
///
/// `value` 的低 `size` 字节按小端序写入。
pub fn encode_write(
    buf: &mut [u8],
    index: u16,
    sub_index: u8,
    value: u64,
    size: usize,
) -> Result<(), ProtocolError> {
    debug_assert_eq!(buf.len(), write_request_size(size));
    buf[0] = write_control(size)?;
    buf[1..3].copy_from_slice(&index.to_be_bytes());
    buf[3] = sub_index;
    buf[4..4 + size].copy_from_slice(&value.to_le_bytes()[..size]);
    Ok(())
}

/// 解析出的单条 SDO 应答记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoRecord {
    ReadSuccess {
        index: u16,
        sub_index: u8,
        /// 负载宽度（1/2/4/8）
        size: u8,
        /// 负载按小端序零扩展到 64 位
        value: u64,
    },
    ReadError {
        index: u16,
        sub_index: u8,
        code: u32,
    },
    WriteSuccess {
        index: u16,
        sub_index: u8,
    },
    WriteError {
        index: u16,
        sub_index: u8,
        code: u32,
    },
}

/// 解析下一条记录；遇到填充字节或帧尾返回 `Ok(None)`
pub fn parse_record(reader: &mut FrameReader<'_>) -> Result<Option<SdoRecord>, ProtocolError> {
    let Some(control) = reader.peek_u8() else {
        return Ok(None);
    };
    if control == PADDING {
        return Ok(None);
    }

    if let Some(size) = read_success_size(control) {
        reader.take_u8("SdoReadSuccess")?;
        let index = reader.take_u16_be("SdoReadSuccess")?;
        let sub_index = reader.take_u8("SdoReadSuccess")?;
        let value = match size {
            1 => reader.take::<1>("SdoReadSuccess")?[0] as u64,
            2 => u16::from_le_bytes(reader.take::<2>("SdoReadSuccess")?) as u64,
            4 => u32::from_le_bytes(reader.take::<4>("SdoReadSuccess")?) as u64,
            _ => reader.take_u64_le("SdoReadSuccess")?,
        };
        return Ok(Some(SdoRecord::ReadSuccess {
            index,
            sub_index,
            size: size as u8,
            value,
        }));
    }

    match control {
        READ_ERROR => {
            reader.take_u8("SdoReadError")?;
            let index = reader.take_u16_be("SdoReadError")?;
            let sub_index = reader.take_u8("SdoReadError")?;
            let code = reader.take_u32_le("SdoReadError")?;
            Ok(Some(SdoRecord::ReadError {
                index,
                sub_index,
                code,
            }))
        },
        WRITE_SUCCESS => {
            reader.take_u8("SdoWriteSuccess")?;
            let index = reader.take_u16_be("SdoWriteSuccess")?;
            let sub_index = reader.take_u8("SdoWriteSuccess")?;
            Ok(Some(SdoRecord::WriteSuccess { index, sub_index }))
        },
        WRITE_ERROR => {
            reader.take_u8("SdoWriteError")?;
            let index = reader.take_u16_be("SdoWriteError")?;
            let sub_index = reader.take_u8("SdoWriteError")?;
            let code = reader.take_u32_le("SdoWriteError")?;
            Ok(Some(SdoRecord::WriteError {
                index,
                sub_index,
                code,
            }))
        },
        other => Err(ProtocolError::InvalidSdoControl(other)),
    }
}
