//! 手级设备表面与构造序列
//!
//! `Hand` 持有协议处理器并暴露三层作用域（手 / 手指 / 关节）的
//! 类型化对象访问。构造时完成设备独占、字典注册、固件校验、特性
//! 探测与基线配置。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use dexhand_driver::{Context8, DriverError, Handler, Value8};
use dexhand_usb::{Transport, UsbTransport};

use crate::data::{
    self, DataObject, HAND_OBJECTS, HandData, JOINT_OBJECTS, JointData, ReadableData,
    STORAGE_UNIT_COUNT, WritableData, index_offset, joint_block_base,
};
use crate::finger::Finger;
use crate::latch::{Latch, latch_completion};
use crate::realtime::{LowPass, RealtimeHandle};
use crate::version::FirmwareVersion;
use crate::HandError;

/// 同步操作默认超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// 设备打开选项
#[derive(Debug, Clone)]
pub struct HandOptions {
    /// 序列号过滤（多设备时必填）
    pub serial_number: Option<String>,
    /// 产品 ID 过滤；`None` 为任意
    pub usb_pid: Option<u16>,
    /// 厂商 ID
    pub usb_vid: u16,
    /// 关节排除位图（20 位，置位关节的所有操作直接成功且无流量）
    pub mask: u32,
}

impl Default for HandOptions {
    fn default() -> Self {
        Self {
            serial_number: None,
            usb_pid: None,
            usb_vid: 0x0483,
            mask: 0,
        }
    }
}

/// 按固件版本探测出的可选特性
#[derive(Debug, Default, Clone, Copy)]
pub struct Features {
    /// 关节固件 ≥ 6.4.0-J：滤波在设备侧执行
    pub firmware_filter: bool,
    /// 手固件 ≥ 3.2.0-B：RPDO 直接分发
    pub rpdo_directly_distribute: bool,
    /// 全系统固件 ≥ 1.1.0：异常检测与 TPDO 主动上报
    pub tpdo_proactively_report: bool,
}

/// 五指灵巧手
pub struct Hand {
    pub(crate) handler: Handler,
    features: Features,
}

impl Hand {
    /// 打开并初始化设备
    pub fn open(options: HandOptions) -> Result<Self, HandError> {
        let transport = UsbTransport::open(
            options.usb_vid,
            options.usb_pid,
            options.serial_number.as_deref(),
        )?;
        Self::with_transport(Arc::new(transport), options.mask)
    }

    /// 在任意传输上构造（测试与仿真入口）
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        mask: u32,
    ) -> Result<Self, HandError> {
        let mut handler = Handler::new(transport, STORAGE_UNIT_COUNT)?;
        register_dictionary(&mut handler, mask)?;
        handler.start_transmit_receive()?;

        let mut hand = Hand {
            handler,
            features: Features::default(),
        };

        hand.check_firmware_version()?;
        hand.configure_baseline()?;
        Ok(hand)
    }

    pub fn features(&self) -> Features {
        self.features
    }

    // ========================================================================
    // 作用域
    // ========================================================================

    pub fn finger(&self, index: usize) -> Result<Finger<'_>, HandError> {
        if index >= 5 {
            return Err(HandError::IndexOutOfBounds("0, 1, 2, 3, 4"));
        }
        Ok(Finger::new(self, index))
    }

    pub fn finger_thumb(&self) -> Finger<'_> {
        Finger::new(self, 0)
    }
    pub fn finger_index(&self) -> Finger<'_> {
        Finger::new(self, 1)
    }
    pub fn finger_middle(&self) -> Finger<'_> {
        Finger::new(self, 2)
    }
    pub fn finger_ring(&self) -> Finger<'_> {
        Finger::new(self, 3)
    }
    pub fn finger_little(&self) -> Finger<'_> {
        Finger::new(self, 4)
    }

    // ========================================================================
    // 手级对象操作
    // ========================================================================

    /// 同步读手级对象
    pub fn read<D: HandData + ReadableData>(
        &self,
        timeout: Duration,
    ) -> Result<D::Value, HandError> {
        let latch = Latch::new();
        let error = self.read_into_latch(&latch, D::SLOT, timeout).err();
        let waited = latch.wait();
        if let Some(error) = error {
            return Err(error.into());
        }
        waited?;
        Ok(self.get::<D>())
    }

    /// 异步读手级对象（计入闭锁）
    pub fn read_async<D: HandData + ReadableData>(
        &self,
        latch: &Latch,
        timeout: Duration,
    ) -> Result<(), HandError> {
        self.read_into_latch(latch, D::SLOT, timeout)?;
        Ok(())
    }

    /// 异步读手级对象；已有未决操作时静默放弃
    pub fn read_async_unchecked<D: HandData + ReadableData>(
        &self,
        timeout: Duration,
    ) -> Result<(), HandError> {
        self.handler
            .read_async_unchecked(D::SLOT, to_nanos(timeout))?;
        Ok(())
    }

    /// 取手级对象缓存值
    pub fn get<D: HandData>(&self) -> D::Value {
        self.handler.get(D::SLOT).get::<D::Value>()
    }

    /// 同步写手级对象（写后回读确认）
    pub fn write<D: HandData + WritableData>(
        &self,
        value: D::Value,
        timeout: Duration,
    ) -> Result<(), HandError> {
        let latch = Latch::new();
        let error = self
            .write_into_latch(&latch, D::SLOT, Value8::new(value), timeout)
            .err();
        let waited = latch.wait();
        if let Some(error) = error {
            return Err(error.into());
        }
        waited
    }

    /// 异步写手级对象（计入闭锁）
    pub fn write_async<D: HandData + WritableData>(
        &self,
        latch: &Latch,
        value: D::Value,
        timeout: Duration,
    ) -> Result<(), HandError> {
        self.write_into_latch(latch, D::SLOT, Value8::new(value), timeout)?;
        Ok(())
    }

    /// 异步写手级对象；已有未决操作时仅更新值槽
    pub fn write_async_unchecked<D: HandData + WritableData>(
        &self,
        value: D::Value,
        timeout: Duration,
    ) -> Result<(), HandError> {
        self.handler
            .write_async_unchecked(Value8::new(value), D::SLOT, to_nanos(timeout))?;
        Ok(())
    }

    // ========================================================================
    // 关节对象广播操作（全部 20 关节）
    // ========================================================================

    /// 同步广播读关节对象；各关节值经 `joint().get` 获取
    pub fn read_joint<D: JointData + ReadableData>(
        &self,
        timeout: Duration,
    ) -> Result<(), HandError> {
        let latch = Latch::new();
        let mut first_error = None;
        for finger in 0..5 {
            for joint in 0..4 {
                let storage_id = joint_block_base(finger, joint) + D::SLOT;
                if let Err(e) = self.read_into_latch(&latch, storage_id, timeout) {
                    first_error.get_or_insert(e);
                }
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error.into());
        }
        waited
    }

    /// 异步广播读关节对象
    pub fn read_joint_async<D: JointData + ReadableData>(
        &self,
        latch: &Latch,
        timeout: Duration,
    ) -> Result<(), HandError> {
        for finger in 0..5 {
            for joint in 0..4 {
                self.read_into_latch(latch, joint_block_base(finger, joint) + D::SLOT, timeout)?;
            }
        }
        Ok(())
    }

    /// 同步广播写关节对象（同一值写入全部 20 关节）
    pub fn write_joint<D: JointData + WritableData>(
        &self,
        value: D::Value,
        timeout: Duration,
    ) -> Result<(), HandError> {
        let latch = Latch::new();
        let mut first_error = None;
        for finger in 0..5 {
            for joint in 0..4 {
                let storage_id = joint_block_base(finger, joint) + D::SLOT;
                if let Err(e) =
                    self.write_into_latch(&latch, storage_id, Value8::new(value), timeout)
                {
                    first_error.get_or_insert(e);
                }
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error.into());
        }
        waited
    }

    /// 异步广播写关节对象
    pub fn write_joint_async<D: JointData + WritableData>(
        &self,
        latch: &Latch,
        value: D::Value,
        timeout: Duration,
    ) -> Result<(), HandError> {
        for finger in 0..5 {
            for joint in 0..4 {
                self.write_into_latch(
                    latch,
                    joint_block_base(finger, joint) + D::SLOT,
                    Value8::new(value),
                    timeout,
                )?;
            }
        }
        Ok(())
    }

    /// 批量写 20 关节目标位置（每关节独立值）
    pub fn write_joint_target_positions(
        &self,
        positions: [[f64; 4]; 5],
        timeout: Duration,
    ) -> Result<(), HandError> {
        let latch = Latch::new();
        let mut first_error = None;
        for finger in 0..5 {
            for joint in 0..4 {
                let storage_id =
                    joint_block_base(finger, joint) + data::joint::TargetPosition::SLOT;
                if let Err(e) = self.write_into_latch(
                    &latch,
                    storage_id,
                    Value8::new(positions[finger][joint]),
                    timeout,
                ) {
                    first_error.get_or_insert(e);
                }
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error.into());
        }
        waited
    }

    // ========================================================================
    // 实时（PDO）
    // ========================================================================

    /// 实际位置快照（先 acquire 上行版本号，保证组内一致）
    pub fn realtime_joint_actual_position(&self) -> [[f64; 4]; 5] {
        let _ = self.handler.upstream_version();
        let mirror = self.handler.realtime_get_joint_actual_position();
        let mut snapshot = [[0.0; 4]; 5];
        for finger in 0..5 {
            for joint in 0..4 {
                snapshot[finger][joint] =
                    mirror[finger][joint].load(std::sync::atomic::Ordering::Relaxed);
            }
        }
        snapshot
    }

    /// 直发一帧目标位置（固件滤波兼容路径）
    pub fn realtime_set_joint_target_position(
        &self,
        positions: [[f64; 4]; 5],
    ) -> Result<(), HandError> {
        self.handler.realtime_set_joint_target_position(&positions)?;
        Ok(())
    }

    /// 创建实时控制器
    ///
    /// 固件滤波特性可用时把截止频率写入设备并返回直通句柄；否则
    /// 读取初始位置、附着主机侧滤波控制器。句柄 drop 时自动分离。
    pub fn realtime_controller(
        &self,
        enable_upstream: bool,
        filter: LowPass,
    ) -> Result<RealtimeHandle<'_>, HandError> {
        if self.features.firmware_filter {
            self.write_joint::<data::joint::PositionFilterCutoffFreq>(
                filter.cutoff_freq() as f32,
                DEFAULT_TIMEOUT,
            )?;
            return Ok(RealtimeHandle::compatible(self));
        }

        // 读初始位置需要关节临时使能
        let last_enabled = self.save_and_enable_joints()?;
        let positions_read = self.read_joint::<data::joint::ActualPosition>(DEFAULT_TIMEOUT);
        self.revert_enabled_joints(&last_enabled)?;
        positions_read?;

        let mut initial = [[0.0f64; 4]; 5];
        for finger in 0..5 {
            for joint in 0..4 {
                let storage_id =
                    joint_block_base(finger, joint) + data::joint::ActualPosition::SLOT;
                initial[finger][joint] = self.handler.get(storage_id).get::<f64>();
            }
        }

        RealtimeHandle::attach_filtered(self, &initial, filter, enable_upstream)
    }

    /// 启动链路延迟测试
    pub fn start_latency_test(&self) -> Result<(), HandError> {
        let last_enabled = self.save_and_disable_joints()?;

        let latch = Latch::new();
        let mut first_error = None;
        for result in [
            self.write_async::<data::hand::RPdoId>(&latch, 0xD0, DEFAULT_TIMEOUT),
            self.write_async::<data::hand::TPdoId>(&latch, 0xD0, DEFAULT_TIMEOUT),
            self.write_async::<data::hand::PdoInterval>(&latch, 2000, DEFAULT_TIMEOUT),
            self.write_async::<data::hand::PdoEnabled>(&latch, 1, DEFAULT_TIMEOUT),
        ] {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error);
        }
        waited?;

        self.revert_disabled_joints(&last_enabled)?;
        self.handler.start_latency_test()?;
        Ok(())
    }

    /// 结束链路延迟测试
    pub fn stop_latency_test(&self) -> Result<(), HandError> {
        let last_enabled = self.save_and_disable_joints()?;
        self.write::<data::hand::PdoEnabled>(0, DEFAULT_TIMEOUT)?;
        self.revert_disabled_joints(&last_enabled)?;
        self.handler.stop_latency_test()?;
        Ok(())
    }

    // ========================================================================
    // 原始 SDO 直通（诊断）
    // ========================================================================

    /// 同步读任意对象；`finger_id == -1` 为手级
    pub fn raw_sdo_read(
        &self,
        finger_id: i32,
        joint_id: i32,
        index: u16,
        sub_index: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>, HandError> {
        let offset = scope_index_offset(finger_id, joint_id)?;
        Ok(self
            .handler
            .raw_sdo_read(index + offset, sub_index, to_nanos(timeout))?)
    }

    /// 同步写任意对象；`finger_id == -1` 为手级
    pub fn raw_sdo_write(
        &self,
        finger_id: i32,
        joint_id: i32,
        index: u16,
        sub_index: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), HandError> {
        let offset = scope_index_offset(finger_id, joint_id)?;
        self.handler
            .raw_sdo_write(index + offset, sub_index, data, to_nanos(timeout))?;
        Ok(())
    }

    /// 读取产品序列号（0x5202.1–6，六段 4 字节 ASCII）
    pub fn product_serial_number(&self, timeout: Duration) -> Result<String, HandError> {
        let mut bytes = Vec::with_capacity(24);
        for sub_index in 1..=6u8 {
            bytes.extend(self.handler.raw_sdo_read(0x5202, sub_index, to_nanos(timeout))?);
        }
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// 关闭线程亲和检查（此后由调用方自行串行化公开操作）
    pub fn disable_thread_safe_check(&self) {
        self.handler.disable_thread_safe_check();
    }

    // ========================================================================
    // 内部
    // ========================================================================

    pub(crate) fn read_into_latch(
        &self,
        latch: &Latch,
        storage_id: usize,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        latch.count_up();
        let result = self.handler.read_async(
            storage_id,
            to_nanos(timeout),
            latch_completion,
            Context8::from_ptr(latch as *const Latch),
        );
        if result.is_err() {
            latch.count_down(true);
        }
        result
    }

    pub(crate) fn write_into_latch(
        &self,
        latch: &Latch,
        storage_id: usize,
        value: Value8,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        latch.count_up();
        let result = self.handler.write_async(
            value,
            storage_id,
            to_nanos(timeout),
            latch_completion,
            Context8::from_ptr(latch as *const Latch),
        );
        if result.is_err() {
            latch.count_down(true);
        }
        result
    }

    /// 记录并失能全部已使能关节
    pub(crate) fn save_and_disable_joints(&self) -> Result<[[bool; 4]; 5], HandError> {
        let mut last_enabled = [[false; 4]; 5];
        let latch = Latch::new();
        let mut first_error = None;
        for finger in 0..5 {
            for joint in 0..4 {
                let storage_id = joint_block_base(finger, joint) + data::joint::Enabled::SLOT;
                last_enabled[finger][joint] = self.handler.get(storage_id).get::<bool>();
                if last_enabled[finger][joint]
                    && let Err(e) =
                        self.write_into_latch(&latch, storage_id, Value8::new(false), DEFAULT_TIMEOUT)
                {
                    first_error.get_or_insert(e);
                }
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error.into());
        }
        waited?;
        Ok(last_enabled)
    }

    /// 恢复先前已使能的关节
    pub(crate) fn revert_disabled_joints(
        &self,
        last_enabled: &[[bool; 4]; 5],
    ) -> Result<(), HandError> {
        let latch = Latch::new();
        let mut first_error = None;
        for finger in 0..5 {
            for joint in 0..4 {
                if last_enabled[finger][joint] {
                    let storage_id = joint_block_base(finger, joint) + data::joint::Enabled::SLOT;
                    if let Err(e) =
                        self.write_into_latch(&latch, storage_id, Value8::new(true), DEFAULT_TIMEOUT)
                    {
                        first_error.get_or_insert(e);
                    }
                }
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error.into());
        }
        waited
    }

    /// 记录并使能全部未使能关节
    pub(crate) fn save_and_enable_joints(&self) -> Result<[[bool; 4]; 5], HandError> {
        let mut last_enabled = [[false; 4]; 5];
        let latch = Latch::new();
        let mut first_error = None;
        for finger in 0..5 {
            for joint in 0..4 {
                let storage_id = joint_block_base(finger, joint) + data::joint::Enabled::SLOT;
                last_enabled[finger][joint] = self.handler.get(storage_id).get::<bool>();
                if !last_enabled[finger][joint]
                    && let Err(e) =
                        self.write_into_latch(&latch, storage_id, Value8::new(true), DEFAULT_TIMEOUT)
                {
                    first_error.get_or_insert(e);
                }
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error.into());
        }
        waited?;
        Ok(last_enabled)
    }

    /// 恢复先前未使能的关节
    pub(crate) fn revert_enabled_joints(
        &self,
        last_enabled: &[[bool; 4]; 5],
    ) -> Result<(), HandError> {
        let latch = Latch::new();
        let mut first_error = None;
        for finger in 0..5 {
            for joint in 0..4 {
                if !last_enabled[finger][joint] {
                    let storage_id = joint_block_base(finger, joint) + data::joint::Enabled::SLOT;
                    if let Err(e) =
                        self.write_into_latch(&latch, storage_id, Value8::new(false), DEFAULT_TIMEOUT)
                    {
                        first_error.get_or_insert(e);
                    }
                }
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error.into());
        }
        waited
    }

    fn check_firmware_version(&mut self) -> Result<(), HandError> {
        let latch = Latch::new();
        self.read_async::<data::hand::FirmwareVersion>(&latch, DEFAULT_TIMEOUT)?;
        self.read_joint_async::<data::joint::FirmwareVersion>(&latch, DEFAULT_TIMEOUT)?;
        latch.wait()?;

        let hand_version = FirmwareVersion::from_bits(self.get::<data::hand::FirmwareVersion>());
        if hand_version < FirmwareVersion::new(3, 0, 0) {
            return Err(HandError::FirmwareIncompatible(hand_version.to_string()));
        }

        let joint_version_at = |finger: usize, joint: usize| {
            let storage_id = joint_block_base(finger, joint) + data::joint::FirmwareVersion::SLOT;
            FirmwareVersion::from_bits(self.handler.get(storage_id).get::<u32>())
        };
        let joint_version = joint_version_at(0, 0);
        let mut joint_version_consistent = true;
        for finger in 0..5 {
            for joint in 0..4 {
                if joint_version_at(finger, joint) != joint_version {
                    joint_version_consistent = false;
                }
            }
        }

        let mut full_system_logged = false;
        if hand_version >= FirmwareVersion::with_pre(3, 1, 0, b'D') {
            let full_system = FirmwareVersion::from_bits(
                self.read::<data::hand::FullSystemFirmwareVersion>(DEFAULT_TIMEOUT)?,
            );
            if full_system.major > 0 {
                info!("Using firmware version: {full_system}");
                full_system_logged = true;

                if full_system >= FirmwareVersion::new(1, 1, 0) {
                    self.features.tpdo_proactively_report = true;
                    debug!("TPdo proactively report enabled");
                }
            }
        }

        if !full_system_logged {
            if joint_version_consistent {
                info!("Using firmware version: {hand_version} & {joint_version}");
            } else {
                info!("Using firmware version: {hand_version} & [Matrix]");
                for finger in 0..5 {
                    let row = (0..4)
                        .map(|joint| joint_version_at(finger, joint).to_string())
                        .collect::<Vec<_>>()
                        .join("  ");
                    info!("  {row}");
                }
                warn!("Inconsistent driver board firmware version detected");
            }
        }

        if joint_version_consistent && joint_version >= FirmwareVersion::with_pre(6, 4, 0, b'J') {
            self.features.firmware_filter = true;
            debug!("Firmware filter enabled");
        }
        if hand_version >= FirmwareVersion::with_pre(3, 2, 0, b'B') {
            self.features.rpdo_directly_distribute = true;
            debug!("RPdo directly distribute enabled");
        }
        Ok(())
    }

    /// 基线配置：失能关节、设定控制模式与 PDO 参数
    fn configure_baseline(&self) -> Result<(), HandError> {
        if self.features.tpdo_proactively_report {
            self.handler
                .enable_host_heartbeat(data::hand::HostTimeoutCounter::SLOT);
        }

        self.write_joint::<data::joint::Enabled>(false, DEFAULT_TIMEOUT)
            .map_err(|_| HandError::InitializationTimeout)?;

        let latch = Latch::new();
        let mut first_error = None;
        let control_mode = if self.features.firmware_filter { 9 } else { 6 };
        if let Err(e) =
            self.write_joint_async::<data::joint::ControlMode>(&latch, control_mode, DEFAULT_TIMEOUT)
        {
            first_error.get_or_insert(e);
        }

        if self.features.firmware_filter {
            let interval = if self.features.rpdo_directly_distribute {
                1000
            } else {
                2000
            };
            for result in [
                self.write_async::<data::hand::RPdoId>(&latch, 0x01, DEFAULT_TIMEOUT),
                self.write_async::<data::hand::TPdoId>(&latch, 0x01, DEFAULT_TIMEOUT),
                self.write_async::<data::hand::PdoInterval>(&latch, interval, DEFAULT_TIMEOUT),
                self.write_async::<data::hand::PdoEnabled>(&latch, 1, DEFAULT_TIMEOUT),
            ] {
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
        } else if let Err(e) =
            self.write_joint_async::<data::joint::EffortLimit>(&latch, 1.0, DEFAULT_TIMEOUT)
        {
            first_error.get_or_insert(e);
        }

        if self.features.rpdo_directly_distribute
            && let Err(e) =
                self.write_async::<data::hand::RPdoDirectlyDistribute>(&latch, 1, DEFAULT_TIMEOUT)
        {
            first_error.get_or_insert(e);
        }
        if self.features.tpdo_proactively_report
            && let Err(e) =
                self.write_async::<data::hand::TPdoProactivelyReport>(&latch, 1, DEFAULT_TIMEOUT)
        {
            first_error.get_or_insert(e);
        }

        let waited = latch.wait();
        if first_error.is_some() || waited.is_err() {
            return Err(HandError::InitializationTimeout);
        }
        Ok(())
    }
}

/// 注册完整字典：手级块 + 5 × 4 关节块（索引变基、屏蔽位应用）
fn register_dictionary(handler: &mut Handler, mask: u32) -> Result<(), DriverError> {
    use dexhand_driver::policy;

    for (slot, descriptor) in HAND_OBJECTS.iter().enumerate() {
        handler.init_storage_info(slot, descriptor(0, 0))?;
    }

    for finger in 0..5 {
        for joint in 0..4 {
            let base = joint_block_base(finger, joint);
            let offset = index_offset(finger, joint);
            let masked = mask & (1u32 << (finger * 4 + joint)) != 0;

            for (slot, descriptor) in JOINT_OBJECTS.iter().enumerate() {
                let mut info = descriptor(finger, joint);
                info.index += offset;
                if masked {
                    info.policy |= policy::MASKED;
                }
                handler.init_storage_info(base + slot, info)?;
            }
        }
    }
    Ok(())
}

fn scope_index_offset(finger_id: i32, joint_id: i32) -> Result<u16, HandError> {
    if finger_id == -1 {
        return Ok(0);
    }
    if !(0..=4).contains(&finger_id) {
        return Err(HandError::IndexOutOfBounds("-1 (hand) or 0..=4"));
    }
    if !(0..=3).contains(&joint_id) {
        return Err(HandError::IndexOutOfBounds("0, 1, 2, 3"));
    }
    Ok(index_offset(finger_id as usize, joint_id as usize))
}

pub(crate) fn to_nanos(timeout: Duration) -> i64 {
    i64::try_from(timeout.as_nanos()).unwrap_or(i64::MAX)
}
