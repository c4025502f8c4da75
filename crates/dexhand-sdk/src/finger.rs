//! 手指作用域
//!
//! 纯作用域前端：自身不持有对象，对关节对象做 4 路广播。

use std::time::Duration;

use dexhand_driver::Value8;

use crate::data::{self, DataObject, JointData, ReadableData, WritableData, joint_block_base};
use crate::hand::Hand;
use crate::joint::Joint;
use crate::latch::Latch;
use crate::HandError;

#[derive(Clone, Copy)]
pub struct Finger<'a> {
    hand: &'a Hand,
    finger: usize,
}

impl<'a> Finger<'a> {
    pub(crate) fn new(hand: &'a Hand, finger: usize) -> Self {
        Self { hand, finger }
    }

    pub fn index(&self) -> usize {
        self.finger
    }

    pub fn joint(&self, index: usize) -> Result<Joint<'a>, HandError> {
        if index >= 4 {
            return Err(HandError::IndexOutOfBounds("0, 1, 2, 3"));
        }
        Ok(Joint::new(self.hand, self.finger, index))
    }

    /// 同步广播读本指 4 个关节的对象；各关节值经 `joint().get` 获取
    pub fn read<D: JointData + ReadableData>(&self, timeout: Duration) -> Result<(), HandError> {
        let latch = Latch::new();
        let mut first_error = None;
        for joint in 0..4 {
            let storage_id = joint_block_base(self.finger, joint) + D::SLOT;
            if let Err(e) = self.hand.read_into_latch(&latch, storage_id, timeout) {
                first_error.get_or_insert(e);
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error.into());
        }
        waited
    }

    /// 异步广播读（计入闭锁）
    pub fn read_async<D: JointData + ReadableData>(
        &self,
        latch: &Latch,
        timeout: Duration,
    ) -> Result<(), HandError> {
        for joint in 0..4 {
            self.hand
                .read_into_latch(latch, joint_block_base(self.finger, joint) + D::SLOT, timeout)?;
        }
        Ok(())
    }

    /// 同步广播写（同一值写入本指 4 个关节）
    pub fn write<D: JointData + WritableData>(
        &self,
        value: D::Value,
        timeout: Duration,
    ) -> Result<(), HandError> {
        let latch = Latch::new();
        let mut first_error = None;
        for joint in 0..4 {
            let storage_id = joint_block_base(self.finger, joint) + D::SLOT;
            if let Err(e) =
                self.hand
                    .write_into_latch(&latch, storage_id, Value8::new(value), timeout)
            {
                first_error.get_or_insert(e);
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error.into());
        }
        waited
    }

    /// 异步广播写（计入闭锁）
    pub fn write_async<D: JointData + WritableData>(
        &self,
        latch: &Latch,
        value: D::Value,
        timeout: Duration,
    ) -> Result<(), HandError> {
        for joint in 0..4 {
            self.hand.write_into_latch(
                latch,
                joint_block_base(self.finger, joint) + D::SLOT,
                Value8::new(value),
                timeout,
            )?;
        }
        Ok(())
    }

    /// 批量写本指 4 关节目标位置（每关节独立值）
    pub fn write_joint_target_positions(
        &self,
        positions: [f64; 4],
        timeout: Duration,
    ) -> Result<(), HandError> {
        let latch = Latch::new();
        let mut first_error = None;
        for joint in 0..4 {
            let storage_id =
                joint_block_base(self.finger, joint) + data::joint::TargetPosition::SLOT;
            if let Err(e) = self.hand.write_into_latch(
                &latch,
                storage_id,
                Value8::new(positions[joint]),
                timeout,
            ) {
                first_error.get_or_insert(e);
            }
        }
        let waited = latch.wait();
        if let Some(error) = first_error {
            return Err(error.into());
        }
        waited
    }
}
