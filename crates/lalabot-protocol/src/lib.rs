//! # Lalabot Protocol
//!
//! 配送机器人与远端状态存储之间共享的数据模型（无硬件依赖）
//!
//! ## 模块
//!
//! - `room`: 环形轨道房间模型（`RoomRing`，前向距离计算）
//! - `delivery`: 配送记录（`DeliveryRecord`）、状态、进度阶段、隔间编号
//! - `fields`: 远端文档字段名常量
//! - `report`: 安全告警、错误上报、机器人状态文档
//! - `time`: 毫秒级 Unix 时间戳
//!
//! ## 字段命名
//!
//! 历史上不同版本的移动端/机器人使用过 `filesPlaced`、`filesConfirmed`、
//! `filesReceived`、`codeVerified` 等不同字段名表示同一类"人工确认"。
//! 本 crate 固定使用：
//!
//! - 取件确认：[`fields::FILES_CONFIRMED`]
//! - 收件验证：[`fields::CODE_VERIFIED`]

pub mod delivery;
pub mod fields;
pub mod report;
pub mod room;
pub mod time;

use thiserror::Error;

pub use delivery::{CompartmentId, DeliveryId, DeliveryRecord, DeliveryStatus, ProgressStage};
pub use report::{AlertKind, ErrorReport, RobotStatus, SecurityAlert};
pub use room::{RoomIndex, RoomRing};
pub use time::Timestamp;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 房间编号超出环形轨道范围
    #[error("Room {room} is outside the ring (0..={max})")]
    RoomOutOfRange { room: u8, max: u8 },

    /// 隔间编号无效（仅支持 1..=3）
    #[error("Invalid compartment id: {0} (expected 1..=3)")]
    InvalidCompartment(u8),

    /// 进度阶段无效（仅支持 0..=3）
    #[error("Invalid progress stage: {0} (expected 0..=3)")]
    InvalidStage(u8),

    /// 房间数量无效
    #[error("Invalid room count: {0} (expected 1..=4)")]
    InvalidRoomCount(u8),

    /// 记录字段缺失或格式不符
    #[error("Malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },
}
