//! PDO 记录编解码
//!
//! 下行：目标位置流（可附带上行请求标志）与延迟测试帧。
//! 上行：实际位置（0x01）、位置 + 电流 + 错误码（0x02）、
//! 延迟测试结果（0xD0）。

use crate::{FrameReader, ProtocolError};

/// 上行变体：仅位置
pub const READ_ID_POSITIONS: u8 = 0x01;
/// 上行变体：位置 + iq 电流 + 错误码
pub const READ_ID_POS_CUR_ERR: u8 = 0x02;
/// 上行变体：延迟测试结果
pub const READ_ID_LATENCY: u8 = 0xD0;

/// 手指数量
pub const FINGER_COUNT: usize = 5;
/// 每指关节数量
pub const JOINT_COUNT: usize = 4;

/// 上行请求帧：`{write_id=0x00, read_id=0x01}`
#[derive(Debug, Default, Clone, Copy)]
pub struct PdoRead;

impl PdoRead {
    pub const WIRE_SIZE: usize = 2;

    pub fn pack(&self) -> [u8; Self::WIRE_SIZE] {
        [0x00, READ_ID_POSITIONS]
    }
}

/// 下行控制帧：20 关节目标位置 + 微秒时间戳
///
/// `read_id` 为 0x01 时设备随帧回传实际位置，0x00 时不回传。
#[derive(Debug, Clone, Copy)]
pub struct PdoWrite {
    pub read_id: u8,
    pub target_positions: [[i32; JOINT_COUNT]; FINGER_COUNT],
    pub timestamp: u32,
}

impl PdoWrite {
    pub const WIRE_SIZE: usize = 2 + 4 * JOINT_COUNT * FINGER_COUNT + 4;

    pub fn pack_into(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), Self::WIRE_SIZE);
        buf[0] = 0x01; // write_id
        buf[1] = self.read_id;
        let mut offset = 2;
        for finger in &self.target_positions {
            for position in finger {
                buf[offset..offset + 4].copy_from_slice(&position.to_le_bytes());
                offset += 4;
            }
        }
        buf[offset..offset + 4].copy_from_slice(&self.timestamp.to_le_bytes());
    }
}

/// 延迟测试下行帧：`{write_id=0xD0, read_id=0xD0, id}`
#[derive(Debug, Clone, Copy)]
pub struct LatencyTest {
    pub id: u32,
}

impl LatencyTest {
    pub const WIRE_SIZE: usize = 6;

    pub fn pack(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0] = READ_ID_LATENCY;
        buf[1] = READ_ID_LATENCY;
        buf[2..6].copy_from_slice(&self.id.to_le_bytes());
        buf
    }
}

/// 0x02 上行帧的单关节负载
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct JointPosCurErr {
    pub position: i32,
    pub iq_a: f32,
    pub error_code: u32,
}

impl JointPosCurErr {
    const WIRE_SIZE: usize = 12;

    fn parse(reader: &mut FrameReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            position: reader.take_i32_le("JointPosCurErr")?,
            iq_a: reader.take_f32_le("JointPosCurErr")?,
            error_code: reader.take_u32_le("JointPosCurErr")?,
        })
    }
}

/// 延迟测试的单关节五段时间戳
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencyJointStamps {
    pub id: u32,
    pub t0_spinal_rx: u32,
    pub t1_spinal_tx: u32,
    pub t2_joint_rx: u32,
    pub t3_joint_tx: u32,
    pub t4_spinal_rx: u32,
}

/// 延迟测试结果：20 组关节时间戳 + 末段设备时间戳
#[derive(Debug, Clone, Copy)]
pub struct LatencyTestResult {
    pub joints: [LatencyJointStamps; FINGER_COUNT * JOINT_COUNT],
    pub t5_spinal_tx: u32,
    pub t_usb_rx_tx: u32,
}

impl LatencyTestResult {
    fn parse(reader: &mut FrameReader<'_>) -> Result<Self, ProtocolError> {
        let mut joints = [LatencyJointStamps::default(); FINGER_COUNT * JOINT_COUNT];
        for slot in &mut joints {
            *slot = LatencyJointStamps {
                id: reader.take_u32_le("LatencyTestResult")?,
                t0_spinal_rx: reader.take_u32_le("LatencyTestResult")?,
                t1_spinal_tx: reader.take_u32_le("LatencyTestResult")?,
                t2_joint_rx: reader.take_u32_le("LatencyTestResult")?,
                t3_joint_tx: reader.take_u32_le("LatencyTestResult")?,
                t4_spinal_rx: reader.take_u32_le("LatencyTestResult")?,
            };
        }
        Ok(Self {
            joints,
            t5_spinal_tx: reader.take_u32_le("LatencyTestResult")?,
            t_usb_rx_tx: reader.take_u32_le("LatencyTestResult")?,
        })
    }
}

/// 解析后的上行 PDO 帧
#[derive(Debug)]
pub enum PdoUpstream {
    Positions([[i32; JOINT_COUNT]; FINGER_COUNT]),
    PositionsCurErr(Box<[[JointPosCurErr; JOINT_COUNT]; FINGER_COUNT]>),
    LatencyResult(Box<LatencyTestResult>),
}

/// 解析上行 PDO 帧（帧头 `{write_id, read_id}` 之后按 `read_id` 分发）
pub fn parse_upstream(reader: &mut FrameReader<'_>) -> Result<PdoUpstream, ProtocolError> {
    let _write_id = reader.take_u8("PdoHeader")?;
    let read_id = reader.take_u8("PdoHeader")?;

    match read_id {
        READ_ID_POSITIONS => {
            let mut positions = [[0i32; JOINT_COUNT]; FINGER_COUNT];
            for finger in &mut positions {
                for position in finger.iter_mut() {
                    *position = reader.take_i32_le("PdoPositions")?;
                }
            }
            Ok(PdoUpstream::Positions(positions))
        },
        READ_ID_POS_CUR_ERR => {
            let mut joints = Box::new([[JointPosCurErr::default(); JOINT_COUNT]; FINGER_COUNT]);
            for finger in joints.iter_mut() {
                for joint in finger.iter_mut() {
                    *joint = JointPosCurErr::parse(reader)?;
                }
            }
            Ok(PdoUpstream::PositionsCurErr(joints))
        },
        READ_ID_LATENCY => Ok(PdoUpstream::LatencyResult(Box::new(
            LatencyTestResult::parse(reader)?,
        ))),
        other => Err(ProtocolError::InvalidPdoReadId(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdo_read_pack() {
        assert_eq!(PdoRead.pack(), [0x00, 0x01]);
    }

    #[test]
    fn test_pdo_write_layout() {
        let mut positions = [[0i32; JOINT_COUNT]; FINGER_COUNT];
        positions[0][0] = 0x11223344;
        positions[4][3] = -1;
        let write = PdoWrite {
            read_id: 0x01,
            target_positions: positions,
            timestamp: 0xAABBCCDD,
        };

        let mut buf = [0u8; PdoWrite::WIRE_SIZE];
        write.pack_into(&mut buf);

        assert_eq!(buf.len(), 86);
        assert_eq!(buf[0], 0x01);
        assert_eq!(buf[1], 0x01);
        assert_eq!(buf[2..6], [0x44, 0x33, 0x22, 0x11]); // F0J0 小端
        assert_eq!(buf[78..82], [0xFF, 0xFF, 0xFF, 0xFF]); // F4J3
        assert_eq!(buf[82..86], [0xDD, 0xCC, 0xBB, 0xAA]); // 时间戳
    }

    #[test]
    fn test_latency_test_pack() {
        let frame = LatencyTest { id: 7 };
        assert_eq!(frame.pack(), [0xD0, 0xD0, 0x07, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_parse_positions_upstream() {
        let mut data = vec![0x01, 0x01];
        for value in 0..20i32 {
            data.extend_from_slice(&value.to_le_bytes());
        }
        let mut reader = FrameReader::new(&data);
        match parse_upstream(&mut reader).unwrap() {
            PdoUpstream::Positions(positions) => {
                assert_eq!(positions[0][0], 0);
                assert_eq!(positions[0][3], 3);
                assert_eq!(positions[4][3], 19);
            },
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_parse_pos_cur_err_upstream() {
        let mut data = vec![0x01, 0x02];
        for _ in 0..20 {
            data.extend_from_slice(&100i32.to_le_bytes());
            data.extend_from_slice(&0.5f32.to_le_bytes());
            data.extend_from_slice(&0x42u32.to_le_bytes());
        }
        let mut reader = FrameReader::new(&data);
        match parse_upstream(&mut reader).unwrap() {
            PdoUpstream::PositionsCurErr(joints) => {
                assert_eq!(joints[2][1].position, 100);
                assert_eq!(joints[2][1].iq_a, 0.5);
                assert_eq!(joints[2][1].error_code, 0x42);
            },
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_parse_latency_result() {
        let mut data = vec![0xD0, 0xD0];
        for joint in 0..20u32 {
            for stage in 0..6u32 {
                data.extend_from_slice(&(joint * 10 + stage).to_le_bytes());
            }
        }
        data.extend_from_slice(&999u32.to_le_bytes());
        data.extend_from_slice(&1000u32.to_le_bytes());

        let mut reader = FrameReader::new(&data);
        match parse_upstream(&mut reader).unwrap() {
            PdoUpstream::LatencyResult(result) => {
                assert_eq!(result.joints[0].id, 0);
                assert_eq!(result.joints[19].t4_spinal_rx, 195);
                assert_eq!(result.t5_spinal_tx, 999);
                assert_eq!(result.t_usb_rx_tx, 1000);
            },
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_read_id() {
        let mut reader = FrameReader::new(&[0x01, 0x7E]);
        assert!(matches!(
            parse_upstream(&mut reader),
            Err(ProtocolError::InvalidPdoReadId(0x7E))
        ));
    }

    #[test]
    fn test_parse_truncated_upstream() {
        let mut reader = FrameReader::new(&[0x01, 0x01, 0x00, 0x00]);
        assert!(matches!(
            parse_upstream(&mut reader),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}
