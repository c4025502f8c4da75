//! 协议处理器
//!
//! 在一对 bulk 端点上复用两类流量：SDO（请求/应答，199 Hz 扫描线程
//! 驱动）与 PDO（500 Hz 实时流）。对象存储为扁平的 64 字节对齐单元
//! 数组，公开线程与引擎线程之间只经由每单元的原子操作字交接。
//!
//! # 线程模型
//!
//! - 公开线程：构造线程（默认强制亲和检查），发布 NONE→WAITING；
//! - 扫描线程：独占 SDO 帧构造器与单元状态机推进；
//! - PDO 线程：独占控制器与 PDO 请求流（与延迟测试互斥）；
//! - 传输事件线程：接收回调，更新单元 / 镜像 / 直通槽。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, error};

use dexhand_protocol::pdo::{LatencyTest, PdoRead, PdoWrite};
use dexhand_protocol::wire::{FRAME_TYPE_PDO, FRAME_TYPE_SDO};
use dexhand_protocol::FrameBuilder;
use dexhand_usb::Transport;

use crate::clock;
use crate::controller::{JointPositions, RealtimeController};
use crate::latency::LatencyTester;
use crate::raw_sdo::{RAW_SDO_SLOT_COUNT, RawMode, RawPhase, RawSdoSlot};
use crate::storage::{Mode, StorageCell, StorageInfo, to_raw_position};
use crate::sweep;
use crate::value::{AtomicF64, Completion, Context8, Value8};
use crate::DriverError;

/// PDO 循环频率（Hz）
pub const PDO_UPDATE_RATE: f64 = 500.0;

pub(crate) fn index_map_key(index: u16, sub_index: u8) -> u32 {
    ((index as u32) << 8) | sub_index as u32
}

/// 跨线程共享的处理器状态
pub(crate) struct Shared {
    pub transport: Arc<dyn Transport>,
    pub cells: Box<[StorageCell]>,
    /// (索引 << 8 | 子索引) → 单元编号；`start_transmit_receive` 后只读
    pub index_map: HashMap<u32, usize>,
    pub raw_slots: [RawSdoSlot; RAW_SDO_SLOT_COUNT],

    /// PDO 帧构造器。逻辑上单生产者（PDO 线程或经亲和检查的公开
    /// 线程，二者互斥存在），锁仅用于满足借用规则，无竞争。
    pub pdo_builder: Mutex<FrameBuilder>,

    pub actual_position: [[AtomicF64; 4]; 5],
    pub error_code: [[AtomicU32; 4]; 5],
    pub upstream_version: AtomicU64,

    /// 延迟测试器：接收路径 try_lock 探测存在性，附着/分离持锁改写
    pub latency: Mutex<Option<Arc<LatencyTester>>>,

    pub sdo_stop: AtomicBool,

    /// 心跳单元编号；`usize::MAX` 表示未启用
    pub heartbeat_cell: AtomicUsize,
    pub heartbeat_value: AtomicU32,
    pub heartbeat_last_nanos: AtomicU64,
}

enum PdoWorker {
    Controller {
        stop: Arc<AtomicBool>,
        thread: JoinHandle<Box<dyn RealtimeController>>,
    },
    Latency {
        stop: Arc<AtomicBool>,
        thread: JoinHandle<()>,
    },
}

/// 协议处理器
pub struct Handler {
    shared: Arc<Shared>,
    operation_thread: Mutex<Option<ThreadId>>,
    sdo_thread: Option<JoinHandle<()>>,
    pdo_worker: Mutex<Option<PdoWorker>>,
}

impl Handler {
    /// 创建处理器；单元元信息经 [`Handler::init_storage_info`] 逐个
    /// 填入后调用 [`Handler::start_transmit_receive`]。
    pub fn new(
        transport: Arc<dyn Transport>,
        storage_unit_count: usize,
    ) -> Result<Self, DriverError> {
        let cells = (0..storage_unit_count)
            .map(|_| StorageCell::default())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let pdo_builder = FrameBuilder::new(Arc::clone(&transport), FRAME_TYPE_PDO)?;

        let shared = Arc::new(Shared {
            transport,
            cells,
            index_map: HashMap::new(),
            raw_slots: Default::default(),
            pdo_builder: Mutex::new(pdo_builder),
            actual_position: Default::default(),
            error_code: Default::default(),
            upstream_version: AtomicU64::new(0),
            latency: Mutex::new(None),
            sdo_stop: AtomicBool::new(false),
            heartbeat_cell: AtomicUsize::new(usize::MAX),
            heartbeat_value: AtomicU32::new(0),
            heartbeat_last_nanos: AtomicU64::new(0),
        });

        Ok(Self {
            shared,
            operation_thread: Mutex::new(Some(std::thread::current().id())),
            sdo_thread: None,
            pdo_worker: Mutex::new(None),
        })
    }

    /// 填入单元元信息并登记索引映射（仅限启动前）
    pub fn init_storage_info(
        &mut self,
        storage_id: usize,
        info: StorageInfo,
    ) -> Result<(), DriverError> {
        let shared =
            Arc::get_mut(&mut self.shared).ok_or(DriverError::Logic("Handler already started"))?;
        shared.cells[storage_id].set_info(info);
        shared
            .index_map
            .insert(index_map_key(info.index, info.sub_index), storage_id);
        Ok(())
    }

    /// 订阅接收并启动 SDO 扫描线程；此后索引映射冻结
    pub fn start_transmit_receive(&mut self) -> Result<(), DriverError> {
        if self.sdo_thread.is_some() {
            return Err(DriverError::Logic("Handler already started"));
        }

        // 弱引用：传输层持有回调，避免与 Shared 内的传输 Arc 成环
        let receiver = Arc::downgrade(&self.shared);
        self.shared.transport.receive(Box::new(move |bytes| {
            if let Some(shared) = receiver.upgrade() {
                shared.on_receive(bytes);
            }
        }))?;

        let builder = FrameBuilder::new(Arc::clone(&self.shared.transport), FRAME_TYPE_SDO)?;
        let shared = Arc::clone(&self.shared);
        let thread = std::thread::Builder::new()
            .name("dexhand-sdo".into())
            .spawn(move || sweep::sdo_thread_main(shared, builder))
            .expect("failed to spawn SDO sweep thread");
        self.sdo_thread = Some(thread);
        Ok(())
    }

    // ========================================================================
    // SDO 对象操作
    // ========================================================================

    /// 异步读；单元已有未完成操作时静默放弃
    pub fn read_async_unchecked(
        &self,
        storage_id: usize,
        timeout_nanos: i64,
    ) -> Result<(), DriverError> {
        self.operation_thread_check()?;

        let cell = &self.shared.cells[storage_id];
        if cell.operation(Ordering::Relaxed).mode != Mode::None {
            return Ok(());
        }
        cell.arm(Mode::Read, timeout_nanos, None, Context8::default());
        Ok(())
    }

    /// 异步读，完成回调携带 8 字节上下文
    pub fn read_async(
        &self,
        storage_id: usize,
        timeout_nanos: i64,
        callback: Completion,
        context: Context8,
    ) -> Result<(), DriverError> {
        self.operation_thread_check()?;

        let cell = &self.shared.cells[storage_id];
        if cell.operation(Ordering::Relaxed).mode != Mode::None {
            return Err(DriverError::Logic(
                "Illegal checked read: Data is being operated!",
            ));
        }
        cell.arm(Mode::Read, timeout_nanos, Some(callback), context);
        Ok(())
    }

    /// 异步写；单元已有未完成操作时仅更新值槽
    pub fn write_async_unchecked(
        &self,
        data: Value8,
        storage_id: usize,
        timeout_nanos: i64,
    ) -> Result<(), DriverError> {
        self.operation_thread_check()?;

        let cell = &self.shared.cells[storage_id];
        cell.store_data(data);
        if cell.operation(Ordering::Relaxed).mode != Mode::None {
            return Ok(());
        }
        cell.arm(Mode::Write, timeout_nanos, None, Context8::default());
        Ok(())
    }

    /// 异步写，完成回调携带 8 字节上下文
    pub fn write_async(
        &self,
        data: Value8,
        storage_id: usize,
        timeout_nanos: i64,
        callback: Completion,
        context: Context8,
    ) -> Result<(), DriverError> {
        self.operation_thread_check()?;

        let cell = &self.shared.cells[storage_id];
        if cell.operation(Ordering::Relaxed).mode != Mode::None {
            return Err(DriverError::Logic(
                "Illegal checked write: Data is being operated!",
            ));
        }
        cell.store_data(data);
        cell.arm(Mode::Write, timeout_nanos, Some(callback), context);
        Ok(())
    }

    /// 取缓存值（按策略翻译）
    pub fn get(&self, storage_id: usize) -> Value8 {
        self.shared.cells[storage_id].load_data()
    }

    /// 单元版本号（新鲜度标记）：acquire 读后再读值可得一致快照
    pub fn version(&self, storage_id: usize) -> u32 {
        self.shared.cells[storage_id].version(Ordering::Acquire)
    }

    /// 启用主机心跳：扫描线程周期性向该单元重发自增计数
    pub fn enable_host_heartbeat(&self, storage_id: usize) {
        self.shared.heartbeat_cell.store(storage_id, Ordering::Relaxed);
    }

    // ========================================================================
    // 实时（PDO）操作
    // ========================================================================

    /// 实际位置镜像。元素为 relaxed 写入；需要一致快照的读方先
    /// acquire 读 [`Handler::upstream_version`]，否则允许元素间撕裂。
    pub fn realtime_get_joint_actual_position(&self) -> &[[AtomicF64; 4]; 5] {
        &self.shared.actual_position
    }

    /// 上行镜像版本号（每次上行帧更新后自增，release 发布）
    pub fn upstream_version(&self) -> u64 {
        self.shared.upstream_version.load(Ordering::Acquire)
    }

    /// 关节错误码镜像
    pub fn realtime_get_joint_error_code(&self) -> &[[AtomicU32; 4]; 5] {
        &self.shared.error_code
    }

    /// 直发一帧目标位置（固件滤波模式下无本地控制器时使用）
    pub fn realtime_set_joint_target_position(
        &self,
        positions: &[[f64; 4]; 5],
    ) -> Result<(), DriverError> {
        self.operation_thread_check()?;

        if self.pdo_worker.lock().is_some() {
            return Err(DriverError::Logic(
                "A realtime controller is already attached.",
            ));
        }
        self.shared.pdo_write(true, positions, 0);
        Ok(())
    }

    /// 附着实时控制器并启动 500 Hz PDO 线程
    pub fn attach_realtime_controller(
        &self,
        controller: Box<dyn RealtimeController>,
        enable_upstream: bool,
    ) -> Result<(), DriverError> {
        self.operation_thread_check()?;

        let mut worker = self.pdo_worker.lock();
        match &*worker {
            Some(PdoWorker::Controller { .. }) => {
                return Err(DriverError::Logic(
                    "A realtime controller is already attached.",
                ));
            },
            Some(PdoWorker::Latency { .. }) => {
                return Err(DriverError::Logic("Latency testing is underway."));
            },
            None => {},
        }

        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.shared);
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("dexhand-pdo".into())
            .spawn(move || pdo_thread_main(shared, thread_stop, controller, enable_upstream))
            .expect("failed to spawn PDO thread");

        *worker = Some(PdoWorker::Controller { stop, thread });
        Ok(())
    }

    /// 分离实时控制器（停止 PDO 线程并取回控制器）
    pub fn detach_realtime_controller(
        &self,
    ) -> Result<Box<dyn RealtimeController>, DriverError> {
        self.operation_thread_check()?;

        let worker = self.pdo_worker.lock().take();
        match worker {
            Some(PdoWorker::Controller { stop, thread }) => {
                stop.store(true, Ordering::Release);
                Ok(thread.join().expect("PDO thread panicked"))
            },
            Some(PdoWorker::Latency { .. }) | None => {
                Err(DriverError::Logic("No realtime controller attached."))
            },
        }
    }

    /// 启动延迟测试（与实时控制器互斥）
    pub fn start_latency_test(&self) -> Result<(), DriverError> {
        self.operation_thread_check()?;

        let mut worker = self.pdo_worker.lock();
        match &*worker {
            Some(PdoWorker::Controller { .. }) => {
                return Err(DriverError::Logic(
                    "A realtime controller is already attached.",
                ));
            },
            Some(PdoWorker::Latency { .. }) => {
                return Err(DriverError::Logic("Latency testing is underway."));
            },
            None => {},
        }

        let tester = Arc::new(LatencyTester::new());
        *self.shared.latency.lock() = Some(Arc::clone(&tester));

        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.shared);
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("dexhand-latency".into())
            .spawn(move || {
                crate::tick::spin(PDO_UPDATE_RATE, &thread_stop, |_| {
                    shared.pdo_latency_frame(tester.next_frame());
                    true
                });
                tester.report();
            })
            .expect("failed to spawn latency thread");

        *worker = Some(PdoWorker::Latency { stop, thread });
        Ok(())
    }

    /// 结束延迟测试
    pub fn stop_latency_test(&self) -> Result<(), DriverError> {
        self.operation_thread_check()?;

        let worker = self.pdo_worker.lock().take();
        match worker {
            Some(PdoWorker::Latency { stop, thread }) => {
                stop.store(true, Ordering::Release);
                thread.join().expect("latency thread panicked");
                *self.shared.latency.lock() = None;
                Ok(())
            },
            Some(PdoWorker::Controller { .. }) | None => {
                Err(DriverError::Logic("Latency testing is not started."))
            },
        }
    }

    // ========================================================================
    // 原始 SDO 直通
    // ========================================================================

    /// 同步读任意 (索引, 子索引)，阻塞至应答或超时
    pub fn raw_sdo_read(
        &self,
        index: u16,
        sub_index: u8,
        timeout_nanos: i64,
    ) -> Result<Vec<u8>, DriverError> {
        self.operation_thread_check()?;

        let slot = self.acquire_raw_slot()?;
        {
            let mut request = slot.request.lock();
            request.index = index;
            request.sub_index = sub_index;
            request.mode = RawMode::Read;
            request.phase = RawPhase::Pending;
            request.read_result.clear();
            request.deadline_nanos = clock::deadline_after(clock::monotonic_nanos(), timeout_nanos);
        }

        let mut request = slot.request.lock();
        while !matches!(request.phase, RawPhase::Success | RawPhase::Failed) {
            slot.completed.wait(&mut request);
        }
        let phase = request.phase;
        let result = std::mem::take(&mut request.read_result);
        drop(request);
        slot.release();

        if phase == RawPhase::Failed {
            return Err(DriverError::Timeout(format!(
                "Raw SDO read timed out: index=0x{index:04X}, sub_index={sub_index}"
            )));
        }
        Ok(result)
    }

    /// 同步写任意 (索引, 子索引)，阻塞至确认或超时
    ///
    /// 实际发送在扫描线程执行，避免与 SDO 帧构造器竞争。
    pub fn raw_sdo_write(
        &self,
        index: u16,
        sub_index: u8,
        data: &[u8],
        timeout_nanos: i64,
    ) -> Result<(), DriverError> {
        self.operation_thread_check()?;

        if !matches!(data.len(), 1 | 2 | 4 | 8) {
            return Err(DriverError::InvalidArgument(format!(
                "Raw SDO write data size must be 1, 2, 4, or 8 bytes, got {}",
                data.len()
            )));
        }

        let slot = self.acquire_raw_slot()?;
        {
            let mut request = slot.request.lock();
            request.index = index;
            request.sub_index = sub_index;
            request.mode = RawMode::Write;
            request.phase = RawPhase::Pending;
            let mut raw = [0u8; 8];
            raw[..data.len()].copy_from_slice(data);
            request.write_data = u64::from_le_bytes(raw);
            request.write_size = data.len() as u8;
            request.deadline_nanos = clock::deadline_after(clock::monotonic_nanos(), timeout_nanos);
        }

        let mut request = slot.request.lock();
        while !matches!(request.phase, RawPhase::Success | RawPhase::Failed) {
            slot.completed.wait(&mut request);
        }
        let phase = request.phase;
        drop(request);
        slot.release();

        if phase == RawPhase::Failed {
            return Err(DriverError::Timeout(format!(
                "Raw SDO write timed out: index=0x{index:04X}, sub_index={sub_index}"
            )));
        }
        Ok(())
    }

    /// 关闭线程亲和检查；此后由调用方自行保证同一时刻只有一个
    /// 线程发起公开操作
    pub fn disable_thread_safe_check(&self) {
        *self.operation_thread.lock() = None;
    }

    fn operation_thread_check(&self) -> Result<(), DriverError> {
        match *self.operation_thread.lock() {
            None => Ok(()),
            Some(id) if id == std::thread::current().id() => Ok(()),
            Some(_) => Err(DriverError::ThreadAffinity),
        }
    }

    fn acquire_raw_slot(&self) -> Result<&RawSdoSlot, DriverError> {
        self.shared
            .raw_slots
            .iter()
            .find(|slot| slot.try_acquire())
            .ok_or(DriverError::NoRawSlot)
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        // 先停 PDO（引擎回到纯 SDO 基线），再停扫描线程
        let worker = self.pdo_worker.lock().take();
        match worker {
            Some(PdoWorker::Controller { stop, thread }) => {
                stop.store(true, Ordering::Release);
                let _ = thread.join();
            },
            Some(PdoWorker::Latency { stop, thread }) => {
                stop.store(true, Ordering::Release);
                let _ = thread.join();
            },
            None => {},
        }

        self.shared.sdo_stop.store(true, Ordering::Release);
        if let Some(thread) = self.sdo_thread.take() {
            let _ = thread.join();
        }
    }
}

impl Shared {
    /// 下发一帧目标位置
    ///
    /// 拇指 J1 原样，其余手指 J1 取负（反向关节），时间戳为循环内
    /// 微秒计数。
    pub(crate) fn pdo_write(
        &self,
        upstream_enabled: bool,
        target_positions: &[[f64; 4]; 5],
        timestamp: u32,
    ) {
        let mut raw = [[0i32; 4]; 5];
        for (i, finger) in target_positions.iter().enumerate() {
            for (j, angle) in finger.iter().enumerate() {
                let mut value = to_raw_position(*angle);
                if j == 0 && i != 0 {
                    value = -value;
                }
                raw[i][j] = value;
            }
        }
        let write = PdoWrite {
            read_id: if upstream_enabled { 0x01 } else { 0x00 },
            target_positions: raw,
            timestamp,
        };

        let mut builder = self.pdo_builder.lock();
        match builder.allocate(PdoWrite::WIRE_SIZE) {
            Ok(buffer) => write.pack_into(buffer),
            Err(e) => error!("PDO write allocation failed: {e}"),
        }
        builder.finalize();
    }

    /// 下发一帧上行请求（引导阶段）
    pub(crate) fn pdo_read_request(&self) {
        let mut builder = self.pdo_builder.lock();
        match builder.allocate(PdoRead::WIRE_SIZE) {
            Ok(buffer) => buffer.copy_from_slice(&PdoRead.pack()),
            Err(e) => error!("PDO read allocation failed: {e}"),
        }
        builder.finalize();
    }

    /// 下发一帧延迟测试
    pub(crate) fn pdo_latency_frame(&self, frame: LatencyTest) {
        let mut builder = self.pdo_builder.lock();
        match builder.allocate(LatencyTest::WIRE_SIZE) {
            Ok(buffer) => buffer.copy_from_slice(&frame.pack()),
            Err(e) => error!("Latency frame allocation failed: {e}"),
        }
        builder.finalize();
    }
}

/// PDO 线程主函数；返回控制器供分离方回收
fn pdo_thread_main(
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    mut controller: Box<dyn RealtimeController>,
    upstream_enabled: bool,
) -> Box<dyn RealtimeController> {
    controller.setup(PDO_UPDATE_RATE);

    if upstream_enabled {
        // 引导阶段：持续请求上行，直到镜像版本号前进；
        // 此后读请求与写命令在同一拍内流水化
        let old_version = shared.upstream_version.load(Ordering::Relaxed);
        crate::tick::spin(PDO_UPDATE_RATE, &stop, |_| {
            shared.pdo_read_request();
            shared.upstream_version.load(Ordering::Acquire) == old_version
        });
        debug!("PDO upstream bootstrap complete");

        crate::tick::spin(PDO_UPDATE_RATE, &stop, |context| {
            let mut positions = JointPositions::default();
            for i in 0..5 {
                for j in 0..4 {
                    positions.value[i][j] =
                        shared.actual_position[i][j].load(Ordering::Relaxed);
                }
            }
            let targets = controller.step(Some(&positions));
            shared.pdo_write(true, &targets.value, context.scheduled_micros());
            true
        });
    } else {
        crate::tick::spin(PDO_UPDATE_RATE, &stop, |context| {
            let targets = controller.step(None);
            shared.pdo_write(false, &targets.value, context.scheduled_micros());
            true
        });
    }

    controller
}
