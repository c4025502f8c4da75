//! 处理器端到端场景（Mock 传输）
//!
//! 覆盖：SDO 读流程、写确认重试、PDO 上行节拍、错误位沿变、
//! 操作超时、直通 SDO、屏蔽单元零流量。

use std::f64::consts::{FRAC_PI_2, TAU};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use dexhand_driver::{
    Context8, DriverError, FilteredController, FilteredControllerBridge, Handler, LowPass,
    StorageInfo, Value8, policy,
};
use dexhand_usb::{BufferPool, ReceiveCallback, TransmitBuffer, Transport, TransportError};

// ============================================================================
// Mock 传输
// ============================================================================

struct MockTransport {
    pool: Arc<BufferPool>,
    sent: Mutex<Vec<Vec<u8>>>,
    callback: Mutex<Option<ReceiveCallback>>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pool: BufferPool::new(64),
            sent: Mutex::new(Vec::new()),
            callback: Mutex::new(None),
        })
    }

    /// 模拟设备上行一帧
    fn inject(&self, bytes: &[u8]) {
        let mut callback = self.callback.lock().unwrap();
        if let Some(callback) = callback.as_mut() {
            callback(bytes);
        }
    }

    fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// 统计已发送帧中 `needle` 字节序列的出现次数
    fn count_sent(&self, needle: &[u8]) -> usize {
        self.sent_frames()
            .iter()
            .map(|frame| {
                frame
                    .windows(needle.len())
                    .filter(|window| *window == needle)
                    .count()
            })
            .sum()
    }
}

impl Transport for MockTransport {
    fn request_transmit_buffer(&self) -> Option<TransmitBuffer> {
        self.pool.pop()
    }

    fn transmit(&self, mut buffer: TransmitBuffer, size: usize) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(buffer.data()[..size].to_vec());
        Ok(())
    }

    fn receive(&self, callback: ReceiveCallback) -> Result<(), TransportError> {
        *self.callback.lock().unwrap() = Some(callback);
        Ok(())
    }
}

// ============================================================================
// 帧与轮询辅助
// ============================================================================

fn frame_with_type(frame_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x55, 0xAA, 0x00, 0x00, 0x01, 0x00, frame_type, 0x00];
    frame.extend_from_slice(payload);
    while frame.len() % 16 != 0 {
        frame.push(0);
    }
    frame
}

fn sdo_frame(records: &[u8]) -> Vec<u8> {
    frame_with_type(0x21, records)
}

fn pdo_frame(payload: &[u8]) -> Vec<u8> {
    frame_with_type(0x11, payload)
}

/// 0x02 上行帧：所有关节同一位置原始值与错误码
fn pdo_pos_cur_err_frame(raw_positions: [[i32; 4]; 5], error_code: u32) -> Vec<u8> {
    let mut payload = vec![0x01, 0x02];
    for finger in &raw_positions {
        for position in finger {
            payload.extend_from_slice(&position.to_le_bytes());
            payload.extend_from_slice(&0.0f32.to_le_bytes());
            payload.extend_from_slice(&error_code.to_le_bytes());
        }
    }
    pdo_frame(&payload)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// 完成回调：上下文指向 AtomicI32（-1 未完成 / 0 失败 / 1 成功）
fn completion_flag(context: Context8, success: bool) {
    let flag: *const AtomicI32 = context.as_ptr();
    unsafe { (*flag).store(success as i32, Ordering::Release) };
}

const SECOND: i64 = 1_000_000_000;

// ============================================================================
// 场景
// ============================================================================

/// 场景 1：SDO 读流程
#[test]
fn test_sdo_read_flow() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x5201, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let flag: &'static AtomicI32 = Box::leak(Box::new(AtomicI32::new(-1)));
    handler
        .read_async(0, SECOND, completion_flag, Context8::from_ptr(flag))
        .unwrap();

    // 扫描线程发出读请求（索引大端）
    assert!(wait_until(Duration::from_millis(500), || {
        transport.count_sent(&[0x30, 0x52, 0x01, 0x01]) > 0
    }));

    // 注入读成功应答
    transport.inject(&sdo_frame(&[0x39, 0x52, 0x01, 0x01, 0xAA, 0xBB, 0xCC, 0xDD]));

    assert!(wait_until(Duration::from_millis(500), || {
        flag.load(Ordering::Acquire) != -1
    }));
    assert_eq!(flag.load(Ordering::Acquire), 1);
    assert_eq!(handler.get(0).get::<u32>(), 0xDDCCBBAA);
    assert_eq!(handler.version(0), 1);
}

/// 场景 2：写确认重试
#[test]
fn test_write_confirm_retry() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x2102, 1, 2, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let flag: &'static AtomicI32 = Box::leak(Box::new(AtomicI32::new(-1)));
    handler
        .write_async(
            Value8::new(9u16),
            0,
            5 * SECOND,
            completion_flag,
            Context8::from_ptr(flag),
        )
        .unwrap();

    let write_record = [0x22, 0x21, 0x02, 0x01, 0x09, 0x00];

    // 第一次写请求
    assert!(wait_until(Duration::from_millis(500), || {
        transport.count_sent(&write_record) >= 1
    }));

    // 写应答 + 回读到不一致的值 → 状态退回 WRITING，下一拍重发
    transport.inject(&sdo_frame(&[0x21, 0x21, 0x02, 0x01]));
    transport.inject(&sdo_frame(&[0x37, 0x21, 0x02, 0x01, 0x06, 0x00]));

    assert!(wait_until(Duration::from_millis(500), || {
        transport.count_sent(&write_record) >= 2
    }));
    assert_eq!(flag.load(Ordering::Acquire), -1);

    // 回读一致 → SUCCESS，回调成功
    transport.inject(&sdo_frame(&[0x37, 0x21, 0x02, 0x01, 0x09, 0x00]));
    assert!(wait_until(Duration::from_millis(500), || {
        flag.load(Ordering::Acquire) == 1
    }));
}

/// 场景 3：PDO 上行节拍
#[test]
fn test_pdo_upstream_tick() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x5201, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let controller = FilteredController::new(&[[0.0; 4]; 5], LowPass::new(10.0), true);
    handler
        .attach_realtime_controller(
            Box::new(FilteredControllerBridge(Arc::clone(&controller))),
            true,
        )
        .unwrap();

    // 引导阶段：上行请求帧（PDO 帧首 write_id=0x00, read_id=0x01）出现
    assert!(wait_until(Duration::from_millis(500), || {
        transport
            .sent_frames()
            .iter()
            .any(|frame| frame.len() >= 10 && frame[6] == 0x11 && frame[8] == 0x00 && frame[9] == 0x01)
    }));

    // 注入 0x02 上行帧：F0J0 = π/2，错误码全零
    let mut raw = [[0i32; 4]; 5];
    raw[0][0] = (FRAC_PI_2 * (i32::MAX as f64 / TAU)).round() as i32;
    transport.inject(&pdo_pos_cur_err_frame(raw, 0));

    assert!(wait_until(Duration::from_millis(500), || {
        handler.upstream_version() >= 1
    }));
    let actual = handler.realtime_get_joint_actual_position()[0][0].load(Ordering::Relaxed);
    assert!((actual - FRAC_PI_2).abs() < 1e-6);

    // 主循环：下行写帧（write_id=0x01, read_id=0x01）出现在 PDO 帧首
    controller.set(&[[0.1; 4]; 5]);
    assert!(wait_until(Duration::from_millis(500), || {
        transport
            .sent_frames()
            .iter()
            .any(|frame| frame.len() >= 10 && frame[6] == 0x11 && frame[8] == 0x01 && frame[9] == 0x01)
    }));

    handler.detach_realtime_controller().unwrap();
}

/// 场景 4：错误位沿变
#[test]
fn test_error_bit_transition() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x5201, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let raw = [[0i32; 4]; 5];
    transport.inject(&pdo_pos_cur_err_frame(raw, 0x0000_0000));
    // 位 1（驱动通信故障）与位 6（欠压）置位
    transport.inject(&pdo_pos_cur_err_frame(raw, 0x0000_0042));

    let codes = handler.realtime_get_joint_error_code();
    assert_eq!(codes[0][0].load(Ordering::Relaxed), 0x42);
    assert_eq!(codes[4][3].load(Ordering::Relaxed), 0x42);
    assert_eq!(handler.upstream_version(), 2);
}

/// 场景 5：超时后单元可复用
#[test]
fn test_timeout_then_reuse() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x520A, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let flag: &'static AtomicI32 = Box::leak(Box::new(AtomicI32::new(-1)));
    handler
        .read_async(
            0,
            Duration::from_millis(10).as_nanos() as i64,
            completion_flag,
            Context8::from_ptr(flag),
        )
        .unwrap();

    // 设备不应答：≥10ms 后完成回调以 success=false 触发
    assert!(wait_until(Duration::from_millis(500), || {
        flag.load(Ordering::Acquire) != -1
    }));
    assert_eq!(flag.load(Ordering::Acquire), 0);

    // 同一单元的后续操作可以正常发起并成功
    let flag2: &'static AtomicI32 = Box::leak(Box::new(AtomicI32::new(-1)));
    handler
        .read_async(0, SECOND, completion_flag, Context8::from_ptr(flag2))
        .unwrap();
    assert!(wait_until(Duration::from_millis(500), || {
        transport.count_sent(&[0x30, 0x52, 0x0A, 0x01]) > 0
    }));
    transport.inject(&sdo_frame(&[0x39, 0x52, 0x0A, 0x01, 0x01, 0x00, 0x00, 0x00]));
    assert!(wait_until(Duration::from_millis(500), || {
        flag2.load(Ordering::Acquire) == 1
    }));
}

/// 场景 6：直通 SDO 写经扫描线程发出
#[test]
fn test_raw_sdo_write_passthrough() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x5201, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let injector = {
        let transport = transport.clone();
        std::thread::spawn(move || {
            // 等待扫描线程发出 4 字节写记录（0x24），再注入写应答
            assert!(wait_until(Duration::from_secs(1), || {
                transport.count_sent(&[0x24, 0x5F, 0xFF, 0x00, 0xDE, 0xAD, 0xBE, 0xEF]) > 0
            }));
            transport.inject(&sdo_frame(&[0x21, 0x5F, 0xFF, 0x00]));
        })
    };

    handler
        .raw_sdo_write(0x5FFF, 0, &[0xDE, 0xAD, 0xBE, 0xEF], 2 * SECOND)
        .unwrap();
    injector.join().unwrap();
}

/// 直通 SDO 读：应答按 (索引, 子索引) 匹配
#[test]
fn test_raw_sdo_read_passthrough() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x5201, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let injector = {
        let transport = transport.clone();
        std::thread::spawn(move || {
            assert!(wait_until(Duration::from_secs(1), || {
                transport.count_sent(&[0x30, 0x5F, 0xFE, 0x02]) > 0
            }));
            transport.inject(&sdo_frame(&[0x37, 0x5F, 0xFE, 0x02, 0x34, 0x12]));
        })
    };

    let result = handler.raw_sdo_read(0x5FFE, 2, 2 * SECOND).unwrap();
    assert_eq!(result, vec![0x34, 0x12]);
    injector.join().unwrap();
}

/// 直通 SDO：超时以 TimeoutError 表面化
#[test]
fn test_raw_sdo_timeout() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x5201, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let error = handler
        .raw_sdo_read(0x5FFD, 0, Duration::from_millis(20).as_nanos() as i64)
        .unwrap_err();
    assert!(error.is_timeout(), "unexpected error: {error}");
}

/// 直通 SDO：非法宽度同步报错
#[test]
fn test_raw_sdo_invalid_size() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x5201, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let error = handler.raw_sdo_write(0x5FFF, 0, &[1, 2, 3], SECOND).unwrap_err();
    assert!(matches!(error, DriverError::InvalidArgument(_)));
}

/// 边界：屏蔽单元成功完成且不产生任何线上记录
#[test]
fn test_masked_cell_no_wire_traffic() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x0040, 0, 2, policy::CONTROL_WORD | policy::MASKED))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let flag: &'static AtomicI32 = Box::leak(Box::new(AtomicI32::new(-1)));
    handler
        .write_async(
            Value8::new(true),
            0,
            SECOND,
            completion_flag,
            Context8::from_ptr(flag),
        )
        .unwrap();

    assert!(wait_until(Duration::from_millis(500), || {
        flag.load(Ordering::Acquire) == 1
    }));

    // 发出的 SDO 帧只含帧头与补零，不得出现该对象的任何记录
    for frame in transport.sent_frames() {
        if frame.get(6) == Some(&0x21) {
            assert!(frame[8..].iter().all(|&byte| byte == 0), "unexpected record in {frame:02X?}");
        }
    }
}

/// 未注册对象的应答被记录并丢弃，不影响后续记录解析
#[test]
fn test_unknown_index_discarded() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x5201, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let flag: &'static AtomicI32 = Box::leak(Box::new(AtomicI32::new(-1)));
    handler
        .read_async(0, SECOND, completion_flag, Context8::from_ptr(flag))
        .unwrap();
    assert!(wait_until(Duration::from_millis(500), || {
        transport.count_sent(&[0x30, 0x52, 0x01, 0x01]) > 0
    }));

    // 同一帧里先出现未知对象应答，再出现已注册对象的应答
    transport.inject(&sdo_frame(&[
        0x35, 0x7E, 0x00, 0x00, 0x11, // 未知对象
        0x39, 0x52, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
    ]));

    assert!(wait_until(Duration::from_millis(500), || {
        flag.load(Ordering::Acquire) == 1
    }));
    assert_eq!(handler.get(0).get::<u32>(), 1);
}

/// 逻辑违例：重复附着 / 未附着即分离
#[test]
fn test_controller_attach_logic_violations() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x5201, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    assert!(matches!(
        handler.detach_realtime_controller(),
        Err(DriverError::Logic(_))
    ));

    let controller = FilteredController::new(&[[0.0; 4]; 5], LowPass::new(10.0), false);
    handler
        .attach_realtime_controller(
            Box::new(FilteredControllerBridge(Arc::clone(&controller))),
            false,
        )
        .unwrap();

    let second = FilteredController::new(&[[0.0; 4]; 5], LowPass::new(10.0), false);
    assert!(matches!(
        handler.attach_realtime_controller(
            Box::new(FilteredControllerBridge(second)),
            false,
        ),
        Err(DriverError::Logic(_))
    ));
    assert!(matches!(
        handler.start_latency_test(),
        Err(DriverError::Logic(_))
    ));

    handler.detach_realtime_controller().unwrap();
}

/// 已挂起未决读时再次发起检查读 → 同步逻辑错误
#[test]
fn test_checked_read_while_pending() {
    let transport = MockTransport::new();
    let mut handler = Handler::new(transport.clone(), 1).unwrap();
    handler
        .init_storage_info(0, StorageInfo::new(0x5201, 1, 4, 0))
        .unwrap();
    handler.start_transmit_receive().unwrap();

    let flag: &'static AtomicI32 = Box::leak(Box::new(AtomicI32::new(-1)));
    handler
        .read_async(0, SECOND, completion_flag, Context8::from_ptr(flag))
        .unwrap();
    let flag2: &'static AtomicI32 = Box::leak(Box::new(AtomicI32::new(-1)));
    assert!(matches!(
        handler.read_async(0, SECOND, completion_flag, Context8::from_ptr(flag2)),
        Err(DriverError::Logic(_))
    ));

    // 未决读静默放弃，不报错
    handler.read_async_unchecked(0, SECOND).unwrap();
}
