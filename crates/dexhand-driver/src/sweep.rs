//! SDO 扫描引擎
//!
//! 199 Hz 固定频率遍历全部存储单元，推进各自的操作状态机：
//! WAITING→READING/WRITING→（写确认）→SUCCESS，处理截止超时，
//! 把读/写记录灌入 SDO 帧构造器；随后服务直通槽与主机心跳，
//! 每拍收尾 finalize 一帧。

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dexhand_protocol::{sdo, FrameBuilder};
use spin_sleep::SpinSleeper;
use tracing::{debug, error, trace};

use crate::clock;
use crate::handler::Shared;
use crate::raw_sdo::{RawMode, RawPhase};
use crate::storage::{Mode, State, StorageCell, policy};
use crate::value::Value8;

/// 扫描频率（Hz）
pub const SDO_UPDATE_RATE: f64 = 199.0;

/// 心跳重发间隔
const HEARTBEAT_INTERVAL_NANOS: u64 = 500_000_000;
/// 单次心跳写入的超时
const HEARTBEAT_TIMEOUT_NANOS: i64 = 400_000_000;

pub(crate) fn sdo_thread_main(shared: Arc<Shared>, mut builder: FrameBuilder) {
    let period = Duration::from_secs_f64(1.0 / SDO_UPDATE_RATE);
    let sleeper = SpinSleeper::default();

    loop {
        // Acquire: 观察到停止标志时，请求方的先行写入已可见
        if shared.sdo_stop.load(Ordering::Acquire) {
            trace!("SDO sweep thread: stop flag set, exiting");
            break;
        }

        let tick_start = std::time::Instant::now();
        let now = clock::monotonic_nanos();

        for cell in shared.cells.iter() {
            tick_cell(cell, now, &mut builder);
        }

        service_heartbeat(&shared, now);
        service_raw_slots(&shared, now, &mut builder);

        builder.finalize();

        // 睡掉本拍剩余时间
        sleeper.sleep(period.saturating_sub(tick_start.elapsed()));
    }
}

/// 推进单个存储单元一拍
fn tick_cell(cell: &StorageCell, now: u64, builder: &mut FrameBuilder) {
    let mut operation = cell.operation(Ordering::Acquire);
    if operation.mode == Mode::None {
        return;
    }

    let info = cell.info();

    // 屏蔽单元：不产生任何线上流量，直接短路为成功
    if info.policy & policy::MASKED != 0 {
        operation.state = State::Success;
    }

    if operation.state == State::Success {
        let (callback, context) = cell.take_callback();
        operation.mode = Mode::None;
        // Release：回调运行时单元已可观测地空闲
        cell.store_operation(operation, Ordering::Release);
        if let Some(callback) = callback {
            callback(context, true);
        }
        return;
    }

    if operation.state == State::Waiting {
        cell.set_deadline_nanos(clock::deadline_after(now, cell.timeout_nanos()));
        operation.state = if operation.mode == Mode::Read {
            State::Reading
        } else {
            State::Writing
        };
        cell.store_operation(operation, Ordering::Relaxed);
    } else if now >= cell.deadline_nanos() {
        let (callback, context) = cell.take_callback();
        operation.mode = Mode::None;
        cell.store_operation(operation, Ordering::Release);
        if let Some(callback) = callback {
            callback(context, false);
        }
    } else if matches!(operation.state, State::Reading | State::WritingConfirming) {
        // 确认路径复用读请求：回读刚写入的对象
        debug!(
            "SDO Read Request: 0x{:04X}.{} Mode={:?}, State={:?}",
            info.index, info.sub_index, operation.mode, operation.state
        );
        emit_read(builder, info.index, info.sub_index);
    } else if operation.state == State::Writing {
        operation.state = State::WritingConfirming;
        cell.store_operation(operation, Ordering::Relaxed);
        emit_write(
            builder,
            info.index,
            info.sub_index,
            cell.raw_value(Ordering::Relaxed),
            info.size as usize,
        );
    }
}

/// 重发主机心跳计数（看门狗单元）
fn service_heartbeat(shared: &Shared, now: u64) {
    let storage_id = shared.heartbeat_cell.load(Ordering::Relaxed);
    if storage_id == usize::MAX {
        return;
    }
    let last = shared.heartbeat_last_nanos.load(Ordering::Relaxed);
    if now.saturating_sub(last) < HEARTBEAT_INTERVAL_NANOS {
        return;
    }
    shared.heartbeat_last_nanos.store(now, Ordering::Relaxed);

    let cell = &shared.cells[storage_id];
    if cell.operation(Ordering::Relaxed).mode != Mode::None {
        // 上一次心跳尚未完成，跳过本次
        return;
    }
    let value = shared.heartbeat_value.fetch_add(1, Ordering::Relaxed) + 1;
    cell.store_data(Value8::new(value));
    cell.arm(
        Mode::Write,
        HEARTBEAT_TIMEOUT_NANOS,
        None,
        Default::default(),
    );
    trace!("Host heartbeat re-armed: counter={value}");
}

/// 服务直通槽：发出 PENDING 请求，处理截止超时
fn service_raw_slots(shared: &Shared, now: u64, builder: &mut FrameBuilder) {
    for slot in &shared.raw_slots {
        if !slot.in_use.load(Ordering::Acquire) {
            continue;
        }

        let mut request = slot.request.lock();

        if matches!(
            request.phase,
            RawPhase::Pending | RawPhase::Reading | RawPhase::Writing
        ) && now >= request.deadline_nanos
        {
            request.phase = RawPhase::Failed;
            slot.completed.notify_one();
            continue;
        }

        // 请求只发出一次；应答匹配由接收路径完成
        if request.phase == RawPhase::Pending {
            match request.mode {
                RawMode::Read => {
                    emit_read(builder, request.index, request.sub_index);
                    request.phase = RawPhase::Reading;
                },
                RawMode::Write => {
                    emit_write(
                        builder,
                        request.index,
                        request.sub_index,
                        request.write_data,
                        request.write_size as usize,
                    );
                    request.phase = RawPhase::Writing;
                },
                RawMode::None => {},
            }
        }
    }
}

fn emit_read(builder: &mut FrameBuilder, index: u16, sub_index: u8) {
    match builder.allocate(sdo::READ_REQUEST_SIZE) {
        Ok(buffer) => sdo::encode_read(buffer, index, sub_index),
        Err(e) => error!("SDO read record allocation failed: {e}"),
    }
}

fn emit_write(builder: &mut FrameBuilder, index: u16, sub_index: u8, value: u64, size: usize) {
    match builder.allocate(sdo::write_request_size(size)) {
        Ok(buffer) => {
            if let Err(e) = sdo::encode_write(buffer, index, sub_index, value, size) {
                error!("SDO write record encoding failed: {e}");
            }
        },
        Err(e) => error!("SDO write record allocation failed: {e}"),
    }
}
