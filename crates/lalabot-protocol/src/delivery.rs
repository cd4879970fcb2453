//! 配送记录
//!
//! `delivery_requests/<id>` 下的 JSON 文档由移动端创建，机器人负责推进其状态。
//! 移动端写入的其他字段（留言、分类、取件码等）通过 `extra` 原样保留，
//! 归档时整份文档被复制到 `delivery_history/<id>`。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::ProtocolError;
use crate::room::RoomIndex;
use crate::time::Timestamp;

/// 配送记录标识（远端文档 key）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(String);

impl DeliveryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeliveryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// 隔间编号（1..=3）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CompartmentId(u8);

impl CompartmentId {
    /// 隔间数量
    pub const COUNT: usize = 3;

    pub fn new(id: u8) -> Result<Self, ProtocolError> {
        if (1..=Self::COUNT as u8).contains(&id) {
            Ok(Self(id))
        } else {
            Err(ProtocolError::InvalidCompartment(id))
        }
    }

    /// 全部隔间，按编号升序
    pub fn all() -> impl Iterator<Item = CompartmentId> {
        (1..=Self::COUNT as u8).map(CompartmentId)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// 从 0 开始的下标
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl TryFrom<u8> for CompartmentId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CompartmentId> for u8 {
    fn from(id: CompartmentId) -> u8 {
        id.0
    }
}

impl fmt::Display for CompartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 配送记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// 等待机器人接单
    #[default]
    Pending,
    /// 已分配隔间，配送中
    InProgress,
    /// 已完成
    Completed,
    /// 已取消
    Cancelled,
    /// 其他客户端写入的未知状态
    #[serde(other)]
    Unknown,
}

impl DeliveryStatus {
    /// 机器人是否需要关注该状态的记录
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

/// 移动端展示的进度阶段
///
/// | 值 | 含义 |
/// |----|------|
/// | 0 | 处理中（前往取件点） |
/// | 1 | 运输中 |
/// | 2 | 即将到达 |
/// | 3 | 已到达目的地 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ProgressStage {
    #[default]
    Processing = 0,
    InTransit = 1,
    Approaching = 2,
    Arrived = 3,
}

impl TryFrom<u8> for ProgressStage {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Processing),
            1 => Ok(Self::InTransit),
            2 => Ok(Self::Approaching),
            3 => Ok(Self::Arrived),
            other => Err(ProtocolError::InvalidStage(other)),
        }
    }
}

impl From<ProgressStage> for u8 {
    fn from(stage: ProgressStage) -> u8 {
        stage as u8
    }
}

/// `delivery_requests/<id>` 文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    /// 取件房间
    pub pickup: RoomIndex,
    /// 目的房间
    pub destination: RoomIndex,
    /// 收件人（仅用于日志）
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub status: DeliveryStatus,
    /// 移动端可能写入 0 或 null 表示未分配
    #[serde(default, with = "compartment_field")]
    pub compartment: Option<CompartmentId>,
    #[serde(default)]
    pub progress_stage: ProgressStage,
    #[serde(default)]
    pub current_location: RoomIndex,
    #[serde(default)]
    pub files_confirmed: bool,
    #[serde(default)]
    pub code_verified: bool,
    #[serde(default)]
    pub confirmation_deadline: Option<Timestamp>,
    #[serde(default)]
    pub ready_for_pickup: bool,
    /// 未识别的字段，原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeliveryRecord {
    /// 创建一条新的待处理请求
    pub fn new(pickup: RoomIndex, destination: RoomIndex, receiver: impl Into<String>) -> Self {
        Self {
            pickup,
            destination,
            receiver: receiver.into(),
            status: DeliveryStatus::Pending,
            compartment: None,
            progress_stage: ProgressStage::Processing,
            current_location: 0,
            files_confirmed: false,
            code_verified: false,
            confirmation_deadline: None,
            ready_for_pickup: false,
            extra: Map::new(),
        }
    }

    /// 从 JSON 解析
    pub fn from_value(id: &DeliveryId, value: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(value).map_err(|e| ProtocolError::MalformedRecord {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    /// 转换为 JSON
    pub fn to_value(&self) -> Value {
        // 所有字段均可序列化，失败只可能来自内存不足
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// 合并字段补丁，返回新记录
    ///
    /// 与远端 PATCH 语义一致：只覆盖顶层字段。
    pub fn merged_with(&self, patch: &Map<String, Value>) -> Result<Self, ProtocolError> {
        let mut value = self.to_value();
        if let Value::Object(ref mut object) = value {
            for (key, field) in patch {
                object.insert(key.clone(), field.clone());
            }
        }
        serde_json::from_value(value).map_err(|e| ProtocolError::MalformedRecord {
            id: self
                .extra
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string(),
            reason: e.to_string(),
        })
    }
}

mod compartment_field {
    use super::CompartmentId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<CompartmentId>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(value.map(u8::from).unwrap_or(0))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<CompartmentId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<u8>::deserialize(deserializer)? {
            None | Some(0) => Ok(None),
            Some(id) => CompartmentId::new(id)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
