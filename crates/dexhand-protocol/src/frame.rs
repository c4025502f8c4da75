//! 帧构造器
//!
//! 每个构造器独占一块在途发送缓冲，按顺序追加记录；
//! `finalize` 负责补齐帧头、16 字节对齐补零并移交传输层。
//! 缓冲池耗尽时丢弃当前帧并计数（可观测性），引擎继续运行。

use std::sync::Arc;

use dexhand_usb::{TransmitBuffer, Transport};
use tracing::{error, trace};

use crate::wire::{CRC_SIZE, FRAME_ALIGNMENT, FrameHeader, MAX_RECEIVE_WINDOW};
use crate::ProtocolError;

pub struct FrameBuilder {
    transport: Arc<dyn Transport>,
    header_type: u8,
    buffer: TransmitBuffer,
    cursor: usize,
    dropped_frame_count: u64,
}

impl FrameBuilder {
    /// 创建构造器并立即占用一块发送缓冲
    pub fn new(transport: Arc<dyn Transport>, header_type: u8) -> Result<Self, ProtocolError> {
        let buffer = transport
            .request_transmit_buffer()
            .ok_or(ProtocolError::NoBuffer)?;
        let mut builder = Self {
            transport,
            header_type,
            buffer,
            cursor: 0,
            dropped_frame_count: 0,
        };
        builder.reset_frame();
        Ok(builder)
    }

    /// 预留 `size` 字节的记录空间（含帧尾 CRC 余量检查）
    ///
    /// 空间不足时先 `finalize` 再重试一次；仍不足说明单条记录超过
    /// 帧容量，直接报错。
    pub fn allocate(&mut self, size: usize) -> Result<&mut [u8], ProtocolError> {
        let required = size + CRC_SIZE;
        if self.remaining() <= required {
            self.finalize();
        }
        if self.remaining() <= required {
            return Err(ProtocolError::RecordTooLong(size));
        }

        let start = self.cursor;
        self.cursor += size;
        Ok(&mut self.buffer.data()[start..start + size])
    }

    /// 结束当前帧并发送
    ///
    /// 先申请下一块缓冲：申请失败时丢弃当前帧（计数），保证构造器
    /// 始终持有一块在途缓冲。
    pub fn finalize(&mut self) {
        let Some(new_buffer) = self.transport.request_transmit_buffer() else {
            self.dropped_frame_count += 1;
            self.reset_frame();
            return;
        };

        let buffer = std::mem::replace(&mut self.buffer, new_buffer);
        let size = self.cursor;
        self.reset_frame();
        self.transmit_frame(buffer, size);
    }

    /// 因缓冲池耗尽而丢弃的帧数
    pub fn dropped_frame_count(&self) -> u64 {
        self.dropped_frame_count
    }

    fn remaining(&self) -> usize {
        self.buffer.capacity() - self.cursor
    }

    fn reset_frame(&mut self) {
        self.cursor = FrameHeader::WIRE_SIZE;
    }

    fn transmit_frame(&mut self, mut buffer: TransmitBuffer, size: usize) {
        let blocks = ((size + CRC_SIZE - 1) / FRAME_ALIGNMENT + 1) as u16;
        let padded = blocks as usize * FRAME_ALIGNMENT;

        let data = buffer.data();
        data[size..padded].fill(0);

        let header = FrameHeader {
            frame_type: self.header_type,
            blocks,
            max_receive_window: MAX_RECEIVE_WINDOW,
        };
        data[..FrameHeader::WIRE_SIZE].copy_from_slice(&header.pack());

        trace!("TX [{} bytes] {:02X?}", padded, &data[..padded]);

        if let Err(e) = self.transport.transmit(buffer, padded) {
            error!("Failed to submit transmit frame: {e}");
        }
    }
}
