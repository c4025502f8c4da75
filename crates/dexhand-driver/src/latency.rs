//! 链路延迟测试
//!
//! PDO 的替代模式：每拍下发一个带自增 id 的测试帧，设备回传该 id
//! 在脊柱板 / 关节板五个阶段的时间戳；主机侧按 id 关联出整程
//! 往返延迟并聚合统计。

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dexhand_protocol::pdo::{LatencyTest, LatencyTestResult};
use tracing::{debug, info, warn};

use crate::clock;

/// 在途 id 上限：超过视为设备未应答，旧条目被挤出
const INFLIGHT_DEPTH: usize = 64;

pub(crate) struct LatencyTester {
    next_id: AtomicU32,
    inflight: Mutex<VecDeque<(u32, u64)>>,
    samples: AtomicU64,
    total_rtt_nanos: AtomicU64,
    min_rtt_nanos: AtomicU64,
    max_rtt_nanos: AtomicU64,
}

impl LatencyTester {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            inflight: Mutex::new(VecDeque::with_capacity(INFLIGHT_DEPTH)),
            samples: AtomicU64::new(0),
            total_rtt_nanos: AtomicU64::new(0),
            min_rtt_nanos: AtomicU64::new(u64::MAX),
            max_rtt_nanos: AtomicU64::new(0),
        }
    }

    /// 产生下一个下行测试帧并登记发出时刻
    pub fn next_frame(&self) -> LatencyTest {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut inflight = self.inflight.lock();
        if inflight.len() >= INFLIGHT_DEPTH {
            inflight.pop_front();
        }
        inflight.push_back((id, clock::monotonic_nanos()));
        LatencyTest { id }
    }

    /// 关联一帧测试结果（PDO 接收路径调用）
    pub fn read_result(&self, result: &LatencyTestResult) {
        let now = clock::monotonic_nanos();
        let id = result.joints[0].id;

        let sent = {
            let mut inflight = self.inflight.lock();
            match inflight.iter().position(|&(entry_id, _)| entry_id == id) {
                Some(position) => inflight.remove(position).map(|(_, at)| at),
                None => None,
            }
        };

        let Some(sent) = sent else {
            warn!("Latency result with unknown id {id}, discarded");
            return;
        };

        let rtt = now.saturating_sub(sent);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.total_rtt_nanos.fetch_add(rtt, Ordering::Relaxed);
        self.min_rtt_nanos.fetch_min(rtt, Ordering::Relaxed);
        self.max_rtt_nanos.fetch_max(rtt, Ordering::Relaxed);

        // 设备侧阶段跨度（设备微秒时钟，回绕减法），对 20 关节取平均
        let mut spinal_down = 0u64;
        let mut joint_turn = 0u64;
        let mut spinal_up = 0u64;
        for joint in &result.joints {
            spinal_down += joint.t1_spinal_tx.wrapping_sub(joint.t0_spinal_rx) as u64;
            joint_turn += joint.t3_joint_tx.wrapping_sub(joint.t2_joint_rx) as u64;
            spinal_up += joint.t4_spinal_rx.wrapping_sub(joint.t3_joint_tx) as u64;
        }
        let joints = result.joints.len() as u64;
        debug!(
            "Latency #{id}: rtt={}us, spinal-down={}us, joint={}us, joint-up={}us, usb={}us",
            rtt / 1_000,
            spinal_down / joints,
            joint_turn / joints,
            spinal_up / joints,
            result.t_usb_rx_tx
        );
    }

    /// 输出聚合统计（测试结束时调用）
    pub fn report(&self) {
        let samples = self.samples.load(Ordering::Relaxed);
        if samples == 0 {
            info!("Latency test finished: no results received");
            return;
        }
        info!(
            "Latency test finished: {} samples, rtt min/avg/max = {}/{}/{} us",
            samples,
            self.min_rtt_nanos.load(Ordering::Relaxed) / 1_000,
            self.total_rtt_nanos.load(Ordering::Relaxed) / samples / 1_000,
            self.max_rtt_nanos.load(Ordering::Relaxed) / 1_000,
        );
    }
}
