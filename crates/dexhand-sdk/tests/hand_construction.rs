//! 构造序列端到端测试（脚本化 Mock 设备）
//!
//! Mock 设备解析主机发出的 SDO 帧并同步应答：读请求返回对象仓库
//! 中的值，写请求入库并回 ACK（回读确认自然成立）。以此驱动真实
//! 的固件校验、特性探测与基线配置路径。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use dexhand_sdk::{FirmwareVersion, Hand, HandError, LowPass, data};
use dexhand_usb::{BufferPool, ReceiveCallback, TransmitBuffer, Transport, TransportError};

// ============================================================================
// Mock 设备
// ============================================================================

struct MockDevice {
    pool: Arc<BufferPool>,
    /// 对象仓库：(索引, 子索引) → (宽度, 值)
    objects: Mutex<HashMap<(u16, u8), (u8, u64)>>,
    callback: Mutex<Option<ReceiveCallback>>,
    pdo_frames: Mutex<usize>,
}

impl MockDevice {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pool: BufferPool::new(64),
            objects: Mutex::new(HashMap::new()),
            callback: Mutex::new(None),
            pdo_frames: Mutex::new(0),
        })
    }

    fn seed(&self, index: u16, sub_index: u8, size: u8, value: u64) {
        self.objects.lock().unwrap().insert((index, sub_index), (size, value));
    }

    fn stored(&self, index: u16, sub_index: u8) -> Option<u64> {
        self.objects.lock().unwrap().get(&(index, sub_index)).map(|&(_, v)| v)
    }

    fn pdo_frame_count(&self) -> usize {
        *self.pdo_frames.lock().unwrap()
    }

    fn respond(&self, frame: &[u8]) {
        let mut callback = self.callback.lock().unwrap();
        if let Some(callback) = callback.as_mut() {
            callback(frame);
        }
    }

    /// 解析主机 SDO 帧并生成应答帧
    fn service_sdo(&self, frame: &[u8]) {
        let mut records = Vec::new();
        let mut cursor = 8;

        while cursor < frame.len() {
            let control = frame[cursor];
            if control == 0x00 {
                break;
            }
            let index = u16::from_be_bytes([frame[cursor + 1], frame[cursor + 2]]);
            let sub_index = frame[cursor + 3];

            match control {
                0x30 => {
                    // 读请求 → 读成功应答
                    let (size, value) = self
                        .objects
                        .lock()
                        .unwrap()
                        .get(&(index, sub_index))
                        .copied()
                        .unwrap_or((4, 0));
                    let success_control = match size {
                        1 => 0x35,
                        2 => 0x37,
                        8 => 0x3D,
                        _ => 0x39,
                    };
                    records.push(success_control);
                    records.extend_from_slice(&index.to_be_bytes());
                    records.push(sub_index);
                    records.extend_from_slice(&value.to_le_bytes()[..size as usize]);
                    cursor += 4;
                },
                0x20 | 0x22 | 0x24 | 0x28 => {
                    // 写请求 → 入库 + 写成功应答
                    let size = match control {
                        0x20 => 1usize,
                        0x22 => 2,
                        0x24 => 4,
                        _ => 8,
                    };
                    let mut raw = [0u8; 8];
                    raw[..size].copy_from_slice(&frame[cursor + 4..cursor + 4 + size]);
                    self.objects
                        .lock()
                        .unwrap()
                        .insert((index, sub_index), (size as u8, u64::from_le_bytes(raw)));

                    records.push(0x21);
                    records.extend_from_slice(&index.to_be_bytes());
                    records.push(sub_index);
                    cursor += 4 + size;
                },
                other => panic!("mock device: unexpected SDO control 0x{other:02X}"),
            }
        }

        if records.is_empty() {
            return;
        }
        let mut response = vec![0x55, 0xAA, 0x00, 0x00, 0x01, 0x00, 0x21, 0x00];
        response.extend_from_slice(&records);
        while response.len() % 16 != 0 {
            response.push(0);
        }
        self.respond(&response);
    }
}

impl Transport for MockDevice {
    fn request_transmit_buffer(&self) -> Option<TransmitBuffer> {
        self.pool.pop()
    }

    fn transmit(&self, mut buffer: TransmitBuffer, size: usize) -> Result<(), TransportError> {
        let frame = buffer.data()[..size].to_vec();
        match frame.get(6) {
            Some(&0x21) => self.service_sdo(&frame),
            Some(&0x11) => *self.pdo_frames.lock().unwrap() += 1,
            _ => {},
        }
        Ok(())
    }

    fn receive(&self, callback: ReceiveCallback) -> Result<(), TransportError> {
        *self.callback.lock().unwrap() = Some(callback);
        Ok(())
    }
}

// ============================================================================
// 数据装配
// ============================================================================

fn joint_index(finger: usize, joint: usize, base: u16) -> u16 {
    0x2000 + finger as u16 * 0x800 + joint as u16 * 0x100 + base
}

/// 装配一台固件齐备的设备
fn seed_device(
    device: &MockDevice,
    hand_version: FirmwareVersion,
    joint_version: FirmwareVersion,
    full_system: Option<FirmwareVersion>,
) {
    device.seed(0x5201, 1, 4, hand_version.to_bits() as u64);
    if let Some(full_system) = full_system {
        device.seed(0x5201, 3, 4, full_system.to_bits() as u64);
    }
    for finger in 0..5 {
        for joint in 0..4 {
            device.seed(
                joint_index(finger, joint, 0x01),
                1,
                4,
                joint_version.to_bits() as u64,
            );
        }
    }
}

// ============================================================================
// 场景
// ============================================================================

#[test]
fn test_open_with_firmware_filter_features() {
    let device = MockDevice::new();
    seed_device(
        &device,
        FirmwareVersion::new(3, 3, 0),
        FirmwareVersion::with_pre(6, 4, 0, b'J'),
        Some(FirmwareVersion::new(1, 1, 0)),
    );

    let hand = Hand::with_transport(device.clone(), 0).unwrap();
    let features = hand.features();
    assert!(features.firmware_filter);
    assert!(features.rpdo_directly_distribute);
    assert!(features.tpdo_proactively_report);

    // 基线配置落库：控制模式 9（固件滤波）、PDO 使能、1ms 间隔（直发）
    assert_eq!(device.stored(joint_index(0, 0, 0x02), 1), Some(9));
    assert_eq!(device.stored(0x52A0, 5), Some(1));
    assert_eq!(device.stored(0x52A4, 5), Some(1000));
    assert_eq!(device.stored(0x52A0, 3), Some(1)); // RPDO 直发
    assert_eq!(device.stored(0x52A0, 4), Some(1)); // TPDO 主动上报

    // 全部关节失能（控制字 5 = 清障并失能）
    for finger in 0..5 {
        for joint in 0..4 {
            assert_eq!(device.stored(joint_index(finger, joint, 0x40), 0), Some(5));
        }
    }

    // 缓存的固件版本可读
    let cached = FirmwareVersion::from_bits(hand.get::<data::hand::FirmwareVersion>());
    assert_eq!(cached, FirmwareVersion::new(3, 3, 0));
}

#[test]
fn test_open_without_firmware_filter() {
    let device = MockDevice::new();
    seed_device(
        &device,
        FirmwareVersion::new(3, 0, 0),
        FirmwareVersion::new(5, 0, 0),
        None,
    );

    let hand = Hand::with_transport(device.clone(), 0).unwrap();
    assert!(!hand.features().firmware_filter);
    assert!(!hand.features().rpdo_directly_distribute);

    // 旧固件路径：基线控制模式 6 + 力矩限幅 1.0 A（线上 1000 mA）
    assert_eq!(device.stored(joint_index(0, 0, 0x02), 1), Some(6));
    assert_eq!(device.stored(joint_index(3, 2, 0x07), 2), Some(1000));
    // 不触碰 PDO 配置
    assert_eq!(device.stored(0x52A0, 5), None);
}

#[test]
fn test_open_rejects_outdated_firmware() {
    let device = MockDevice::new();
    seed_device(
        &device,
        FirmwareVersion::new(2, 9, 0),
        FirmwareVersion::new(5, 0, 0),
        None,
    );

    match Hand::with_transport(device, 0) {
        Err(HandError::FirmwareIncompatible(version)) => assert_eq!(version, "2.9.0"),
        other => panic!("unexpected result: {other:?}", other = other.err()),
    }
}

#[test]
fn test_masked_joint_produces_no_wire_traffic() {
    let device = MockDevice::new();
    seed_device(
        &device,
        FirmwareVersion::new(3, 0, 0),
        FirmwareVersion::new(5, 0, 0),
        None,
    );

    // 屏蔽 F0J0（位 0）
    let hand = Hand::with_transport(device.clone(), 0x1).unwrap();

    // 被屏蔽关节的失能写从未上线
    assert_eq!(device.stored(joint_index(0, 0, 0x40), 0), None);
    assert_eq!(device.stored(joint_index(0, 1, 0x40), 0), Some(5));

    // 被屏蔽关节的同步写仍立即成功
    hand.finger(0)
        .unwrap()
        .joint(0)
        .unwrap()
        .write::<data::joint::Enabled>(true, Duration::from_millis(500))
        .unwrap();
    assert_eq!(device.stored(joint_index(0, 0, 0x40), 0), None);
}

#[test]
fn test_joint_reads_and_reversed_translation() {
    let device = MockDevice::new();
    seed_device(
        &device,
        FirmwareVersion::new(3, 0, 0),
        FirmwareVersion::new(5, 0, 0),
        None,
    );

    let raw = (0.5 * (i32::MAX as f64 / std::f64::consts::TAU)).round() as i32;
    device.seed(joint_index(0, 0, 0x64), 0, 4, raw as u32 as u64);
    device.seed(joint_index(1, 0, 0x64), 0, 4, raw as u32 as u64);

    let hand = Hand::with_transport(device.clone(), 0).unwrap();
    let timeout = Duration::from_millis(500);

    // 拇指 J1：正向
    let thumb = hand.finger_thumb().joint(0).unwrap();
    let position = thumb.read::<data::joint::ActualPosition>(timeout).unwrap();
    assert!((position - 0.5).abs() < 1e-6);
    assert!(thumb.version::<data::joint::ActualPosition>() >= 1);

    // 食指 J1：反向关节取负
    let index_j1 = hand.finger_index().joint(0).unwrap();
    let position = index_j1.read::<data::joint::ActualPosition>(timeout).unwrap();
    assert!((position + 0.5).abs() < 1e-6);
}

#[test]
fn test_compatible_realtime_controller() {
    let device = MockDevice::new();
    seed_device(
        &device,
        FirmwareVersion::new(3, 3, 0),
        FirmwareVersion::with_pre(6, 4, 0, b'J'),
        Some(FirmwareVersion::new(1, 0, 0)),
    );

    let hand = Hand::with_transport(device.clone(), 0).unwrap();
    assert!(hand.features().firmware_filter);

    let controller = hand.realtime_controller(true, LowPass::new(20.0)).unwrap();

    // 截止频率写入设备（0x05.19，f32 位型）
    assert_eq!(
        device.stored(joint_index(2, 1, 0x05), 19),
        Some(20.0f32.to_bits() as u64)
    );

    // 兼容路径：目标位置经普通实时接口直发（PDO 帧可见）
    let before = device.pdo_frame_count();
    controller
        .set_joint_target_position([[0.1; 4]; 5])
        .unwrap();
    assert!(device.pdo_frame_count() > before);
}

#[test]
fn test_raw_sdo_scope_offsets() {
    let device = MockDevice::new();
    seed_device(
        &device,
        FirmwareVersion::new(3, 0, 0),
        FirmwareVersion::new(5, 0, 0),
        None,
    );
    // 手级与关节级各放一个诊断对象
    device.seed(0x5FFF, 1, 2, 0xBEEF);
    device.seed(joint_index(2, 3, 0x5F), 0, 4, 0x12345678);

    let hand = Hand::with_transport(device.clone(), 0).unwrap();
    let timeout = Duration::from_millis(500);

    let bytes = hand.raw_sdo_read(-1, 0, 0x5FFF, 1, timeout).unwrap();
    assert_eq!(bytes, vec![0xEF, 0xBE]);

    let bytes = hand.raw_sdo_read(2, 3, 0x5F, 0, timeout).unwrap();
    assert_eq!(bytes, vec![0x78, 0x56, 0x34, 0x12]);

    hand.raw_sdo_write(-1, 0, 0x5FF0, 2, &[0x11, 0x22, 0x33, 0x44], timeout)
        .unwrap();
    assert_eq!(device.stored(0x5FF0, 2), Some(0x44332211));

    assert!(hand.raw_sdo_read(7, 0, 0x5FFF, 1, timeout).is_err());
}

#[test]
fn test_product_serial_number() {
    let device = MockDevice::new();
    seed_device(
        &device,
        FirmwareVersion::new(3, 0, 0),
        FirmwareVersion::new(5, 0, 0),
        None,
    );
    // "DH24-0042" + NUL 填充，按 4 字节块小端入库
    let serial = b"DH24-0042\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0";
    for part in 0..6u8 {
        let offset = part as usize * 4;
        let chunk = u32::from_le_bytes(serial[offset..offset + 4].try_into().unwrap());
        device.seed(0x5202, part + 1, 4, chunk as u64);
    }

    let hand = Hand::with_transport(device.clone(), 0).unwrap();
    let serial = hand
        .product_serial_number(Duration::from_millis(500))
        .unwrap();
    assert_eq!(serial, "DH24-0042");
}
