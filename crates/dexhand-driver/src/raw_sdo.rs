//! 原始 SDO 直通槽
//!
//! 面向诊断场景的任意 (索引, 子索引) 同步读写。四个固定槽位经
//! 原子占用标志复用；请求的实际发送被挪到扫描线程执行，避免与
//! SDO 帧构造器产生双生产者竞争。调用方阻塞在槽位条件变量上。

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

/// 直通槽数量
pub const RAW_SDO_SLOT_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawMode {
    None,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawPhase {
    Idle,
    /// 已安装，等待扫描线程发出请求
    Pending,
    Reading,
    Writing,
    Success,
    Failed,
}

pub(crate) struct RawSdoRequest {
    pub mode: RawMode,
    pub phase: RawPhase,
    pub index: u16,
    pub sub_index: u8,
    /// 写负载缓存（由扫描线程发送）
    pub write_data: u64,
    pub write_size: u8,
    pub read_result: Vec<u8>,
    pub deadline_nanos: u64,
}

impl Default for RawSdoRequest {
    fn default() -> Self {
        Self {
            mode: RawMode::None,
            phase: RawPhase::Idle,
            index: 0,
            sub_index: 0,
            write_data: 0,
            write_size: 0,
            read_result: Vec::new(),
            deadline_nanos: 0,
        }
    }
}

pub(crate) struct RawSdoSlot {
    pub in_use: AtomicBool,
    pub request: Mutex<RawSdoRequest>,
    pub completed: Condvar,
}

impl Default for RawSdoSlot {
    fn default() -> Self {
        Self {
            in_use: AtomicBool::new(false),
            request: Mutex::new(RawSdoRequest::default()),
            completed: Condvar::new(),
        }
    }
}

impl RawSdoSlot {
    /// 尝试占用本槽（CAS 占用标志）
    pub fn try_acquire(&self) -> bool {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// 归还本槽
    pub fn release(&self) {
        let mut request = self.request.lock();
        request.phase = RawPhase::Idle;
        request.mode = RawMode::None;
        drop(request);
        self.in_use.store(false, Ordering::Release);
    }
}
