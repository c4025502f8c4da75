//! 关节作用域（叶子）

use std::time::Duration;

use dexhand_driver::Value8;

use crate::data::{JointData, ReadableData, WritableData, joint_block_base};
use crate::hand::{Hand, to_nanos};
use crate::latch::Latch;
use crate::HandError;

#[derive(Clone, Copy)]
pub struct Joint<'a> {
    hand: &'a Hand,
    finger: usize,
    joint: usize,
}

impl<'a> Joint<'a> {
    pub(crate) fn new(hand: &'a Hand, finger: usize, joint: usize) -> Self {
        Self {
            hand,
            finger,
            joint,
        }
    }

    fn storage_id<D: JointData>(&self) -> usize {
        joint_block_base(self.finger, self.joint) + D::SLOT
    }

    /// 同步读并返回值
    pub fn read<D: JointData + ReadableData>(
        &self,
        timeout: Duration,
    ) -> Result<D::Value, HandError> {
        let latch = Latch::new();
        let error = self
            .hand
            .read_into_latch(&latch, self.storage_id::<D>(), timeout)
            .err();
        let waited = latch.wait();
        if let Some(error) = error {
            return Err(error.into());
        }
        waited?;
        Ok(self.get::<D>())
    }

    /// 异步读（计入闭锁）
    pub fn read_async<D: JointData + ReadableData>(
        &self,
        latch: &Latch,
        timeout: Duration,
    ) -> Result<(), HandError> {
        self.hand
            .read_into_latch(latch, self.storage_id::<D>(), timeout)?;
        Ok(())
    }

    /// 异步读；已有未决操作时静默放弃
    pub fn read_async_unchecked<D: JointData + ReadableData>(
        &self,
        timeout: Duration,
    ) -> Result<(), HandError> {
        self.hand
            .handler
            .read_async_unchecked(self.storage_id::<D>(), to_nanos(timeout))?;
        Ok(())
    }

    /// 取缓存值（按策略翻译，反向关节自动取负）
    pub fn get<D: JointData>(&self) -> D::Value {
        self.hand.handler.get(self.storage_id::<D>()).get::<D::Value>()
    }

    /// 单元版本号：新鲜度标记，成功读完成时递增（回绕跳 0）
    pub fn version<D: JointData>(&self) -> u32 {
        self.hand.handler.version(self.storage_id::<D>())
    }

    /// 同步写（写后回读确认）
    pub fn write<D: JointData + WritableData>(
        &self,
        value: D::Value,
        timeout: Duration,
    ) -> Result<(), HandError> {
        let latch = Latch::new();
        let error = self
            .hand
            .write_into_latch(&latch, self.storage_id::<D>(), Value8::new(value), timeout)
            .err();
        let waited = latch.wait();
        if let Some(error) = error {
            return Err(error.into());
        }
        waited
    }

    /// 异步写（计入闭锁）
    pub fn write_async<D: JointData + WritableData>(
        &self,
        latch: &Latch,
        value: D::Value,
        timeout: Duration,
    ) -> Result<(), HandError> {
        self.hand
            .write_into_latch(latch, self.storage_id::<D>(), Value8::new(value), timeout)?;
        Ok(())
    }

    /// 异步写；已有未决操作时仅更新值槽
    pub fn write_async_unchecked<D: JointData + WritableData>(
        &self,
        value: D::Value,
        timeout: Duration,
    ) -> Result<(), HandError> {
        self.hand.handler.write_async_unchecked(
            Value8::new(value),
            self.storage_id::<D>(),
            to_nanos(timeout),
        )?;
        Ok(())
    }
}
