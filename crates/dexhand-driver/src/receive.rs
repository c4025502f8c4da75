//! 帧接收路径（传输事件线程）
//!
//! SDO 应答先尝试匹配直通槽，再按索引映射更新存储单元；PDO 上行
//! 更新实际位置/错误码镜像并递增版本号。解析失败记录十六进制
//! 转储后丢弃整帧，下一帧继续。

use std::sync::atomic::Ordering;

use dexhand_protocol::pdo::{self, JointPosCurErr, PdoUpstream};
use dexhand_protocol::sdo::{self, SdoRecord};
use dexhand_protocol::wire::{FRAME_TYPE_PDO, FRAME_TYPE_SDO, FrameHeader};
use dexhand_protocol::{FrameReader, ProtocolError};
use tracing::{debug, error, trace, warn};

use crate::handler::{Shared, index_map_key};
use crate::raw_sdo::{RawMode, RawPhase};
use crate::storage::{Mode, State, extract_raw_position, value_mask};

/// 错误位严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Critical,
    Error,
    Warning,
}

struct ErrorDefinition {
    bit: u8,
    description: &'static str,
    remedy: &'static str,
    severity: Severity,
}

const DEFAULT_REMEDY: &str = "Possible hardware damage, please contact customer service.";

/// 关节错误位静态表；位 15 未定义，未知位以位图整体记录
const ERROR_DEFINITIONS: &[ErrorDefinition] = &[
    ErrorDefinition { bit: 0, description: "ADC failure", remedy: DEFAULT_REMEDY, severity: Severity::Critical },
    ErrorDefinition { bit: 1, description: "Driver communication fault", remedy: DEFAULT_REMEDY, severity: Severity::Error },
    ErrorDefinition { bit: 2, description: "Driver fault reported", remedy: DEFAULT_REMEDY, severity: Severity::Error },
    ErrorDefinition { bit: 3, description: "Encoder1 communication fault", remedy: DEFAULT_REMEDY, severity: Severity::Critical },
    ErrorDefinition { bit: 4, description: "Encoder1 noise detected", remedy: DEFAULT_REMEDY, severity: Severity::Error },
    ErrorDefinition { bit: 5, description: "Bus overvoltage", remedy: DEFAULT_REMEDY, severity: Severity::Error },
    ErrorDefinition { bit: 6, description: "Bus undervoltage", remedy: DEFAULT_REMEDY, severity: Severity::Error },
    ErrorDefinition { bit: 7, description: "Transmission slip detected", remedy: DEFAULT_REMEDY, severity: Severity::Critical },
    ErrorDefinition { bit: 8, description: "Phase overcurrent", remedy: DEFAULT_REMEDY, severity: Severity::Error },
    ErrorDefinition { bit: 13, description: "Overtemperature", remedy: "Try improve cooling and reduce load.", severity: Severity::Error },
    ErrorDefinition { bit: 14, description: "Board info invalid", remedy: DEFAULT_REMEDY, severity: Severity::Critical },
    ErrorDefinition { bit: 16, description: "Encoder2 communication error", remedy: DEFAULT_REMEDY, severity: Severity::Warning },
    ErrorDefinition { bit: 17, description: "Encoder2 noise detected", remedy: DEFAULT_REMEDY, severity: Severity::Warning },
    ErrorDefinition { bit: 18, description: "Flash erase error", remedy: DEFAULT_REMEDY, severity: Severity::Warning },
    ErrorDefinition { bit: 19, description: "Flash verify error", remedy: DEFAULT_REMEDY, severity: Severity::Warning },
    ErrorDefinition { bit: 20, description: "Flash write error", remedy: DEFAULT_REMEDY, severity: Severity::Warning },
    ErrorDefinition { bit: 21, description: "User config verification failed", remedy: DEFAULT_REMEDY, severity: Severity::Warning },
    ErrorDefinition { bit: 22, description: "Flash write count limit reached", remedy: DEFAULT_REMEDY, severity: Severity::Warning },
];

impl Shared {
    /// 传输层接收回调入口
    pub(crate) fn on_receive(&self, bytes: &[u8]) {
        trace!("RX [{} bytes] {:02X?}", bytes.len(), bytes);

        let mut reader = FrameReader::new(bytes);
        let result = (|| {
            let header = FrameHeader::parse(&mut reader)?;
            match header.frame_type {
                FRAME_TYPE_SDO => self.read_sdo_frame(&mut reader),
                FRAME_TYPE_PDO => self.read_pdo_frame(&mut reader),
                other => Err(ProtocolError::InvalidHeaderType(other)),
            }
        })();

        if let Err(e) = result {
            error!("RX Frame parsing failed at offset {}", reader.position());
            error!("{e}");
            error!("RX Frame dump [{} bytes] {:02X?}", bytes.len(), bytes);
        }
    }

    fn read_sdo_frame(&self, reader: &mut FrameReader<'_>) -> Result<(), ProtocolError> {
        while let Some(record) = sdo::parse_record(reader)? {
            match record {
                SdoRecord::ReadSuccess {
                    index,
                    sub_index,
                    size,
                    value,
                } => self.on_sdo_read_success(index, sub_index, size, value),
                SdoRecord::WriteSuccess { index, sub_index } => {
                    self.on_sdo_write_success(index, sub_index);
                },
                SdoRecord::ReadError {
                    index,
                    sub_index,
                    code,
                } => {
                    debug!("SDO Read Error: 0x{index:04X}.{sub_index}, code=0x{code:08X}");
                },
                SdoRecord::WriteError {
                    index,
                    sub_index,
                    code,
                } => {
                    debug!("SDO Write Error: 0x{index:04X}.{sub_index}, code=0x{code:08X}");
                },
            }
        }
        Ok(())
    }

    fn on_sdo_read_success(&self, index: u16, sub_index: u8, size: u8, value: u64) {
        // 直通槽优先：不在静态字典里的对象也可能有人在等
        if self.match_raw_read_response(index, sub_index, size, value) {
            return;
        }

        let Some(&storage_id) = self.index_map.get(&index_map_key(index, sub_index)) else {
            warn!("SDO object not found: index=0x{index:04X}, sub-index=0x{sub_index:02X}");
            return;
        };
        let cell = &self.cells[storage_id];
        let operation = cell.operation(Ordering::Acquire);

        debug!(
            "SDO Read Success: 0x{index:04X}.{sub_index} Mode={:?}, State={:?}",
            operation.mode, operation.state
        );

        if operation.mode == Mode::None {
            return;
        }

        if operation.state == State::Reading {
            cell.store_raw_value(value, Ordering::Relaxed);
            cell.bump_version();
            cell.store_operation(
                crate::storage::Operation {
                    mode: operation.mode,
                    state: State::Success,
                },
                Ordering::Release,
            );
        } else if operation.state == State::WritingConfirming {
            // 回读值与写入值一致才算确认；不一致回退重写，
            // 重试预算即截止时刻之前的剩余时间
            let mask = value_mask(size);
            let state = if value & mask == cell.raw_value(Ordering::Relaxed) & mask {
                State::Success
            } else {
                State::Writing
            };
            cell.store_operation(
                crate::storage::Operation {
                    mode: operation.mode,
                    state,
                },
                Ordering::Relaxed,
            );
        }
    }

    fn on_sdo_write_success(&self, index: u16, sub_index: u8) {
        if self.match_raw_write_response(index, sub_index) {
            return;
        }

        let Some(&storage_id) = self.index_map.get(&index_map_key(index, sub_index)) else {
            warn!("SDO object not found: index=0x{index:04X}, sub-index=0x{sub_index:02X}");
            return;
        };
        let cell = &self.cells[storage_id];
        let operation = cell.operation(Ordering::Acquire);
        if operation.mode == Mode::None {
            return;
        }

        // 写确认以回读比对为准；裸写成功只把 WRITING 提前收敛
        if operation.state == State::Writing {
            cell.store_operation(
                crate::storage::Operation {
                    mode: operation.mode,
                    state: State::Success,
                },
                Ordering::Relaxed,
            );
        }
    }

    fn match_raw_read_response(&self, index: u16, sub_index: u8, size: u8, value: u64) -> bool {
        for slot in &self.raw_slots {
            if !slot.in_use.load(Ordering::Acquire) {
                continue;
            }
            let mut request = slot.request.lock();
            if request.index == index
                && request.sub_index == sub_index
                && request.phase == RawPhase::Reading
                && request.mode == RawMode::Read
            {
                request.read_result = value.to_le_bytes()[..size as usize].to_vec();
                request.phase = RawPhase::Success;
                slot.completed.notify_one();
                return true;
            }
        }
        false
    }

    fn match_raw_write_response(&self, index: u16, sub_index: u8) -> bool {
        for slot in &self.raw_slots {
            if !slot.in_use.load(Ordering::Acquire) {
                continue;
            }
            let mut request = slot.request.lock();
            if request.index == index
                && request.sub_index == sub_index
                && request.phase == RawPhase::Writing
                && request.mode == RawMode::Write
            {
                request.phase = RawPhase::Success;
                slot.completed.notify_one();
                return true;
            }
        }
        false
    }

    fn read_pdo_frame(&self, reader: &mut FrameReader<'_>) -> Result<(), ProtocolError> {
        match pdo::parse_upstream(reader)? {
            PdoUpstream::Positions(positions) => {
                debug!("TPDO 0x01 Received");
                self.update_actual_positions(&positions);
                self.bump_upstream_version();
            },
            PdoUpstream::PositionsCurErr(joints) => {
                debug!("TPDO 0x02 Received");
                let mut positions = [[0i32; 4]; 5];
                for i in 0..5 {
                    for j in 0..4 {
                        positions[i][j] = joints[i][j].position;
                    }
                }
                self.update_actual_positions(&positions);
                self.update_error_codes(&joints);
                self.bump_upstream_version();
            },
            PdoUpstream::LatencyResult(result) => {
                // try_lock：附着/分离正在进行时跳过本帧
                if let Some(guard) = self.latency.try_lock() {
                    if let Some(tester) = guard.as_ref() {
                        tester.read_result(&result);
                    }
                }
            },
        }
        Ok(())
    }

    /// 上行位置写入镜像（反向关节取负）
    fn update_actual_positions(&self, positions: &[[i32; 4]; 5]) {
        for i in 0..5 {
            for j in 0..4 {
                let mut value = extract_raw_position(positions[i][j]);
                if j == 0 && i != 0 {
                    value = -value;
                }
                self.actual_position[i][j].store(value, Ordering::Relaxed);
            }
        }
    }

    /// 错误码镜像更新 + 按位沿变日志
    fn update_error_codes(&self, joints: &[[JointPosCurErr; 4]; 5]) {
        for i in 0..5 {
            for j in 0..4 {
                let current = joints[i][j].error_code;
                let previous = self.error_code[i][j].swap(current, Ordering::Relaxed);
                handle_error_code_update(i, j, previous, current);
            }
        }
    }

    /// 镜像元素为 relaxed 写；版本号 release 发布整组更新
    fn bump_upstream_version(&self) {
        self.upstream_version.store(
            self.upstream_version.load(Ordering::Relaxed) + 1,
            Ordering::Release,
        );
    }
}

/// 对新置位的错误位逐位记录日志
fn handle_error_code_update(finger: usize, joint: usize, previous: u32, current: u32) {
    if current == previous {
        return;
    }

    let mut newly_set = current & !previous;
    if newly_set == 0 {
        return;
    }

    for definition in ERROR_DEFINITIONS {
        let mask = 1u32 << definition.bit;
        if newly_set & mask == 0 {
            continue;
        }
        log_error_event(finger, joint, definition);
        newly_set &= !mask;
    }

    if newly_set != 0 {
        error!(
            "Joint Motor F{}J{} Reports unknown exception(s): 0x{:X}",
            finger + 1,
            joint + 1,
            newly_set
        );
    }
}

fn log_error_event(finger: usize, joint: usize, definition: &ErrorDefinition) {
    match definition.severity {
        Severity::Critical | Severity::Error => {
            error!(
                "Joint Motor F{}J{} Reports an exception: {}.",
                finger + 1,
                joint + 1,
                definition.description
            );
            error!("Hint: {}", definition.remedy);
        },
        Severity::Warning => {
            warn!(
                "Joint Motor F{}J{} Reports an exception: {}.",
                finger + 1,
                joint + 1,
                definition.description
            );
            warn!("Hint: {}", definition.remedy);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_table_has_no_bit_15() {
        // 位 15 未定义：未知位必须走位图日志路径
        assert!(ERROR_DEFINITIONS.iter().all(|d| d.bit != 15));
    }

    #[test]
    fn test_error_table_severities() {
        let severity_of = |bit: u8| {
            ERROR_DEFINITIONS
                .iter()
                .find(|d| d.bit == bit)
                .map(|d| d.severity)
        };
        assert_eq!(severity_of(0), Some(Severity::Critical)); // ADC
        assert_eq!(severity_of(1), Some(Severity::Error)); // 驱动通信
        assert_eq!(severity_of(6), Some(Severity::Error)); // 欠压
        assert_eq!(severity_of(7), Some(Severity::Critical)); // 打滑
        assert_eq!(severity_of(16), Some(Severity::Warning)); // 编码器 2
        assert_eq!(severity_of(22), Some(Severity::Warning)); // Flash 写入计数
    }
}
