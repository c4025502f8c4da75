//! 实时控制器句柄
//!
//! 两条路径：
//! - **主机滤波**：附着本地滤波控制器，目标经低通整形后按 500 Hz
//!   下发；句柄 drop 时自动走分离序列。
//! - **固件滤波兼容**：新固件在设备侧滤波，主机只写截止频率并
//!   使用普通的实时位置直发接口。

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::warn;

use dexhand_driver::{FilteredController, FilteredControllerBridge, RealtimeController};
pub use dexhand_driver::LowPass;

use crate::data;
use crate::hand::{DEFAULT_TIMEOUT, Hand};
use crate::latch::Latch;
use crate::HandError;

pub struct RealtimeHandle<'a> {
    hand: &'a Hand,
    kind: HandleKind,
}

enum HandleKind {
    /// 固件滤波：直发路径，无本地控制器
    Compatible,
    /// 主机滤波：已附着的滤波控制器
    Filtered {
        controller: Arc<FilteredController<LowPass>>,
        upstream: bool,
        attached: bool,
    },
}

impl<'a> RealtimeHandle<'a> {
    pub(crate) fn compatible(hand: &'a Hand) -> Self {
        Self {
            hand,
            kind: HandleKind::Compatible,
        }
    }

    pub(crate) fn attach_filtered(
        hand: &'a Hand,
        initial: &[[f64; 4]; 5],
        filter: LowPass,
        upstream: bool,
    ) -> Result<Self, HandError> {
        let controller = FilteredController::new(initial, filter, upstream);
        attach_sequence(
            hand,
            Box::new(FilteredControllerBridge(Arc::clone(&controller))),
            upstream,
        )?;
        Ok(Self {
            hand,
            kind: HandleKind::Filtered {
                controller,
                upstream,
                attached: true,
            },
        })
    }

    /// 投递目标位置
    pub fn set_joint_target_position(&self, positions: [[f64; 4]; 5]) -> Result<(), HandError> {
        match &self.kind {
            HandleKind::Compatible => self.hand.realtime_set_joint_target_position(positions),
            HandleKind::Filtered { controller, .. } => {
                controller.set(&positions);
                Ok(())
            },
        }
    }

    /// 实际位置快照（上行关闭时为逻辑错误）
    pub fn get_joint_actual_position(&self) -> Result<[[f64; 4]; 5], HandError> {
        match &self.kind {
            HandleKind::Compatible => Ok(self.hand.realtime_joint_actual_position()),
            HandleKind::Filtered {
                controller,
                upstream,
                ..
            } => {
                if !upstream {
                    return Err(HandError::UpstreamDisabled);
                }
                let mirror = controller.actual().expect("upstream mirror missing");
                let mut snapshot = [[0.0; 4]; 5];
                for finger in 0..5 {
                    for joint in 0..4 {
                        snapshot[finger][joint] = mirror[finger][joint].load(Ordering::Relaxed);
                    }
                }
                Ok(snapshot)
            },
        }
    }

    /// 显式分离（等价于 drop，但可拿到错误）
    pub fn close(mut self) -> Result<(), HandError> {
        self.detach()
    }

    fn detach(&mut self) -> Result<(), HandError> {
        if let HandleKind::Filtered { attached, .. } = &mut self.kind {
            if !*attached {
                return Ok(());
            }
            *attached = false;
            detach_sequence(self.hand)?;
        }
        Ok(())
    }
}

impl Drop for RealtimeHandle<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            warn!("Realtime controller detach failed on drop: {e}");
        }
    }
}

/// 附着序列：失能关节 → 流式控制模式 + PDO 配置 → 恢复关节 → 附着
fn attach_sequence(
    hand: &Hand,
    controller: Box<dyn RealtimeController>,
    enable_upstream: bool,
) -> Result<(), HandError> {
    let last_enabled = hand.save_and_disable_joints()?;

    let latch = Latch::new();
    let mut first_error = None;
    if let Err(e) =
        hand.write_joint_async::<data::joint::ControlMode>(&latch, 5, DEFAULT_TIMEOUT)
    {
        first_error.get_or_insert(e);
    }
    let tpdo_id = if enable_upstream { 0x01 } else { 0x00 };
    for result in [
        hand.write_async::<data::hand::RPdoId>(&latch, 0x01, DEFAULT_TIMEOUT),
        hand.write_async::<data::hand::TPdoId>(&latch, tpdo_id, DEFAULT_TIMEOUT),
        hand.write_async::<data::hand::PdoInterval>(&latch, 2000, DEFAULT_TIMEOUT),
        hand.write_async::<data::hand::PdoEnabled>(&latch, 1, DEFAULT_TIMEOUT),
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

    hand.revert_disabled_joints(&last_enabled)?;
    hand.handler
        .attach_realtime_controller(controller, enable_upstream)?;
    Ok(())
}

/// 分离序列：失能关节 → 基线控制模式 + PDO 关闭 → 恢复关节 → 停线程
fn detach_sequence(hand: &Hand) -> Result<(), HandError> {
    let last_enabled = hand.save_and_disable_joints()?;

    let latch = Latch::new();
    let mut first_error = None;
    if let Err(e) = hand.write_joint_async::<data::joint::ControlMode>(&latch, 6, DEFAULT_TIMEOUT) {
        first_error.get_or_insert(e);
    }
    if let Err(e) = hand.write_async::<data::hand::PdoEnabled>(&latch, 0, DEFAULT_TIMEOUT) {
        first_error.get_or_insert(e);
    }
    let waited = latch.wait();
    if let Some(error) = first_error {
        return Err(error);
    }
    waited?;

    hand.revert_disabled_joints(&last_enabled)?;
    hand.handler.detach_realtime_controller()?;
    Ok(())
}
