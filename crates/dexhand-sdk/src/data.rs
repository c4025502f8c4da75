//! 静态对象字典
//!
//! 每个字典对象是一个标记类型，携带 {索引, 子索引, 线上宽度,
//! 策略} 常量；类型化访问器只是把常量存储编号转发给处理器的
//! 薄函数。存储编号布局：手级块在前，随后按 手指 × 关节 顺序
//! 排列各关节块。
//!
//! 索引变基：手级对象使用裸 16 位索引；手指 f、关节 j 的对象在
//! 注册时加 `0x2000 + 0x800·f + 0x100·j`。

use dexhand_driver::{StorageInfo, WireValue, policy};

/// 手级对象数量
pub(crate) const HAND_DATA_COUNT: usize = 16;
/// 每关节对象数量
pub(crate) const JOINT_DATA_COUNT: usize = 16;
/// 存储单元总数：1 手 + 5 指 × 4 关节
pub(crate) const STORAGE_UNIT_COUNT: usize = HAND_DATA_COUNT + 20 * JOINT_DATA_COUNT;

/// 手指/关节子树的索引偏移
pub(crate) fn index_offset(finger: usize, joint: usize) -> u16 {
    0x2000 + finger as u16 * 0x800 + joint as u16 * 0x100
}

/// 关节块起始存储编号
pub(crate) fn joint_block_base(finger: usize, joint: usize) -> usize {
    HAND_DATA_COUNT + (finger * 4 + joint) * JOINT_DATA_COUNT
}

/// 位置对象的策略位：除拇指外各指 J1 反向
fn position_policy(finger: usize, joint: usize) -> u32 {
    if joint == 0 && finger != 0 {
        policy::POSITION | policy::POSITION_REVERSED
    } else {
        policy::POSITION
    }
}

fn is_reversed_joint(finger: usize, joint: usize) -> bool {
    joint == 0 && finger != 0
}

/// 字典对象标记
pub trait DataObject {
    type Value: WireValue;

    const INDEX: u16;
    const SUB_INDEX: u8;
    /// 线上宽度（可与 `Value` 的内存宽度不同，如控制字、力矩限幅）
    const SIZE: u8;
    /// 所属块内槽位
    const SLOT: usize;
    const POLICY: u32 = 0;

    fn policy(finger: usize, joint: usize) -> u32 {
        let _ = (finger, joint);
        Self::POLICY
    }

    fn wire_sub_index(finger: usize, joint: usize) -> u8 {
        let _ = (finger, joint);
        Self::SUB_INDEX
    }

    /// 注册用描述符（索引变基由注册方完成）
    fn info(finger: usize, joint: usize) -> StorageInfo {
        StorageInfo::new(
            Self::INDEX,
            Self::wire_sub_index(finger, joint),
            Self::SIZE,
            Self::policy(finger, joint),
        )
    }
}

/// 可读对象
pub trait ReadableData: DataObject {}
/// 可写对象
pub trait WritableData: DataObject {}
/// 手级对象
pub trait HandData: DataObject {}
/// 关节级对象
pub trait JointData: DataObject {}

macro_rules! object {
    ($(#[$doc:meta])* $name:ident : $value:ty, $index:literal, $sub:literal, size $size:literal,
     slot $slot:literal, [$($access:ident),+] $(, policy = $policy:expr)?) => {
        $(#[$doc])*
        pub struct $name;

        impl $crate::data::DataObject for $name {
            type Value = $value;
            const INDEX: u16 = $index;
            const SUB_INDEX: u8 = $sub;
            const SIZE: u8 = $size;
            const SLOT: usize = $slot;
            $(const POLICY: u32 = $policy;)?
        }

        $(object!(@access $name $access);)+
    };
    (@access $name:ident readable) => {
        impl $crate::data::ReadableData for $name {}
    };
    (@access $name:ident writable) => {
        impl $crate::data::WritableData for $name {}
    };
}

/// 手级对象
pub mod hand {
    use dexhand_driver::policy;

    object!(Handedness: u8, 0x5090, 0, size 1, slot 0, [readable]);
    object!(
        /// 主机心跳看门狗计数（由扫描线程周期重发）
        HostTimeoutCounter: u32, 0x50A0, 1, size 4, slot 1, [writable],
        policy = policy::HOST_HEARTBEAT
    );
    object!(FirmwareVersion: u32, 0x5201, 1, size 4, slot 2, [readable]);
    object!(FirmwareDate: u32, 0x5201, 2, size 4, slot 3, [readable]);
    object!(FullSystemFirmwareVersion: u32, 0x5201, 3, size 4, slot 4, [readable]);
    object!(SystemTime: u32, 0x520A, 1, size 4, slot 5, [readable]);
    object!(Temperature: f32, 0x520A, 9, size 4, slot 6, [readable]);
    object!(InputVoltage: f32, 0x520A, 10, size 4, slot 7, [readable]);
    object!(RPdoDirectlyDistribute: u8, 0x52A0, 3, size 1, slot 8, [writable]);
    object!(TPdoProactivelyReport: u8, 0x52A0, 4, size 1, slot 9, [writable]);
    object!(PdoEnabled: u8, 0x52A0, 5, size 1, slot 10, [writable]);
    object!(RPdoId: u16, 0x52A4, 1, size 2, slot 11, [writable]);
    object!(TPdoId: u16, 0x52A4, 2, size 2, slot 12, [writable]);
    object!(PdoInterval: u32, 0x52A4, 5, size 4, slot 13, [writable]);
    object!(RPdoTriggerOffset: u32, 0x52A4, 6, size 4, slot 14, [writable]);
    object!(TPdoTriggerOffset: u32, 0x52A4, 7, size 4, slot 15, [writable]);

    macro_rules! hand_scope {
        ($($name:ident),+ $(,)?) => {
            $(impl super::HandData for $name {})+
        };
    }
    hand_scope!(
        Handedness,
        HostTimeoutCounter,
        FirmwareVersion,
        FirmwareDate,
        FullSystemFirmwareVersion,
        SystemTime,
        Temperature,
        InputVoltage,
        RPdoDirectlyDistribute,
        TPdoProactivelyReport,
        PdoEnabled,
        RPdoId,
        TPdoId,
        PdoInterval,
        RPdoTriggerOffset,
        TPdoTriggerOffset,
    );
}

/// 关节级对象
pub mod joint {
    use super::{DataObject, is_reversed_joint, position_policy};
    use dexhand_driver::policy;

    object!(FirmwareVersion: u32, 0x01, 1, size 4, slot 0, [readable]);
    object!(FirmwareDate: u32, 0x01, 2, size 4, slot 1, [readable]);
    object!(
        /// 控制模式：6 基线 / 5 流式 / 9 固件滤波
        ControlMode: u16, 0x02, 1, size 2, slot 2, [writable]
    );
    object!(SinLevel: u16, 0x05, 8, size 2, slot 3, [writable]);
    object!(PositionFilterCutoffFreq: f32, 0x05, 19, size 4, slot 4, [writable]);
    object!(TorqueSlopeLimitPerCycle: f32, 0x05, 20, size 4, slot 5, [writable]);
    object!(
        /// 力矩限幅：对外安培（f64），线上毫安（u16）
        EffortLimit: f64, 0x07, 2, size 2, slot 6, [readable, writable],
        policy = policy::EFFORT_LIMIT
    );
    object!(BusVoltage: f32, 0x0B, 8, size 4, slot 7, [readable]);
    object!(Temperature: f32, 0x0B, 9, size 4, slot 8, [readable]);
    object!(ResetError: u16, 0x0D, 4, size 2, slot 9, [writable]);
    object!(ErrorCode: u32, 0x3F, 0, size 4, slot 10, [readable]);
    object!(
        /// 关节使能：布尔语义按控制字编码（1 使能 / 5 清障失能）
        Enabled: bool, 0x40, 0, size 2, slot 11, [writable],
        policy = policy::CONTROL_WORD
    );

    /// 实际位置（弧度；反向关节自动取负）
    pub struct ActualPosition;
    impl DataObject for ActualPosition {
        type Value = f64;
        const INDEX: u16 = 0x64;
        const SUB_INDEX: u8 = 0;
        const SIZE: u8 = 4;
        const SLOT: usize = 12;
        fn policy(finger: usize, joint: usize) -> u32 {
            position_policy(finger, joint)
        }
    }
    impl super::ReadableData for ActualPosition {}

    /// 目标位置（弧度）
    pub struct TargetPosition;
    impl DataObject for TargetPosition {
        type Value = f64;
        const INDEX: u16 = 0x7A;
        const SUB_INDEX: u8 = 0;
        const SIZE: u8 = 4;
        const SLOT: usize = 13;
        fn policy(finger: usize, joint: usize) -> u32 {
            position_policy(finger, joint)
        }
    }
    impl super::WritableData for TargetPosition {}

    /// 位置上限；反向关节与下限交换子索引
    pub struct UpperLimit;
    impl DataObject for UpperLimit {
        type Value = f64;
        const INDEX: u16 = 0x0E;
        const SUB_INDEX: u8 = 27;
        const SIZE: u8 = 4;
        const SLOT: usize = 14;
        fn policy(finger: usize, joint: usize) -> u32 {
            position_policy(finger, joint)
        }
        fn wire_sub_index(finger: usize, joint: usize) -> u8 {
            if is_reversed_joint(finger, joint) { 28 } else { 27 }
        }
    }
    impl super::ReadableData for UpperLimit {}

    /// 位置下限；反向关节与上限交换子索引
    pub struct LowerLimit;
    impl DataObject for LowerLimit {
        type Value = f64;
        const INDEX: u16 = 0x0E;
        const SUB_INDEX: u8 = 28;
        const SIZE: u8 = 4;
        const SLOT: usize = 15;
        fn policy(finger: usize, joint: usize) -> u32 {
            position_policy(finger, joint)
        }
        fn wire_sub_index(finger: usize, joint: usize) -> u8 {
            if is_reversed_joint(finger, joint) { 27 } else { 28 }
        }
    }
    impl super::ReadableData for LowerLimit {}

    macro_rules! joint_scope {
        ($($name:ident),+ $(,)?) => {
            $(impl super::JointData for $name {})+
        };
    }
    joint_scope!(
        FirmwareVersion,
        FirmwareDate,
        ControlMode,
        SinLevel,
        PositionFilterCutoffFreq,
        TorqueSlopeLimitPerCycle,
        EffortLimit,
        BusVoltage,
        Temperature,
        ResetError,
        ErrorCode,
        Enabled,
        ActualPosition,
        TargetPosition,
        UpperLimit,
        LowerLimit,
    );
}

type InfoFn = fn(usize, usize) -> StorageInfo;

/// 注册表：顺序与各对象的 `SLOT` 一致
pub(crate) const HAND_OBJECTS: [InfoFn; HAND_DATA_COUNT] = [
    hand::Handedness::info,
    hand::HostTimeoutCounter::info,
    hand::FirmwareVersion::info,
    hand::FirmwareDate::info,
    hand::FullSystemFirmwareVersion::info,
    hand::SystemTime::info,
    hand::Temperature::info,
    hand::InputVoltage::info,
    hand::RPdoDirectlyDistribute::info,
    hand::TPdoProactivelyReport::info,
    hand::PdoEnabled::info,
    hand::RPdoId::info,
    hand::TPdoId::info,
    hand::PdoInterval::info,
    hand::RPdoTriggerOffset::info,
    hand::TPdoTriggerOffset::info,
];

pub(crate) const JOINT_OBJECTS: [InfoFn; JOINT_DATA_COUNT] = [
    joint::FirmwareVersion::info,
    joint::FirmwareDate::info,
    joint::ControlMode::info,
    joint::SinLevel::info,
    joint::PositionFilterCutoffFreq::info,
    joint::TorqueSlopeLimitPerCycle::info,
    joint::EffortLimit::info,
    joint::BusVoltage::info,
    joint::Temperature::info,
    joint::ResetError::info,
    joint::ErrorCode::info,
    joint::Enabled::info,
    joint::ActualPosition::info,
    joint::TargetPosition::info,
    joint::UpperLimit::info,
    joint::LowerLimit::info,
];
