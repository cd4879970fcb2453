//! # Lalabot Store
//!
//! 远端状态存储接口。配送请求由移动端写入 `delivery_requests`，
//! 机器人通过 [`RemoteStateStore`] 读取并推进其状态。
//!
//! ## 后端
//!
//! - [`MemoryStore`]: 进程内文档树，供测试与仿真使用
//! - [`FirebaseStore`]: Firebase Realtime Database REST 接口
//!
//! 写操作均为一次性调用，失败由调用方记录日志，不在此层重试。

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

use lalabot_protocol::{DeliveryId, DeliveryRecord, ErrorReport, SecurityAlert};

pub mod firebase;
pub mod memory;

pub use firebase::{FirebaseConfig, FirebaseStore};
pub use memory::MemoryStore;

/// 存储层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 网络不可达、超时等
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} for {path}")]
    Http { status: u16, path: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Store unavailable")]
    Unavailable,
}

impl StoreError {
    /// 是否可能在稍后自行恢复
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) | StoreError::Unavailable => true,
            StoreError::Http { status, .. } => *status >= 500,
            StoreError::Decode(_) => false,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// 活动配送（`pending` / `in_progress`），按 id 排序
pub type ActiveDeliveries = BTreeMap<DeliveryId, DeliveryRecord>;

/// 远端状态存储
pub trait RemoteStateStore: Send {
    /// 读取全部 `pending` / `in_progress` 记录
    fn get_active_deliveries(&self) -> Result<ActiveDeliveries, StoreError>;

    /// 写入单个字段
    fn update_field(&self, id: &DeliveryId, field: &str, value: Value) -> Result<(), StoreError>;

    /// 一次写入多个字段
    fn patch_fields(&self, id: &DeliveryId, fields: &Map<String, Value>) -> Result<(), StoreError>;

    fn delete_record(&self, id: &DeliveryId) -> Result<(), StoreError>;

    /// 写入 `delivery_history/<id>`
    fn append_history(&self, id: &DeliveryId, record: &Value) -> Result<(), StoreError>;

    fn report_alert(&self, alert: &SecurityAlert) -> Result<(), StoreError>;

    fn report_error(&self, report: &ErrorReport) -> Result<(), StoreError>;

    /// 合并写入 `robot_status`
    fn update_robot_status(&self, fields: &Map<String, Value>) -> Result<(), StoreError>;

    /// 读取并清除操作员的告警复位标志
    fn take_alarm_reset(&self) -> Result<bool, StoreError>;
}

/// 从 `delivery_requests` 文档中挑出活动记录
///
/// 格式错误的记录会被跳过并记录警告。
pub fn parse_active_deliveries(collection: Value) -> ActiveDeliveries {
    let entries = match collection {
        Value::Object(map) => map,
        Value::Null => return ActiveDeliveries::new(),
        other => {
            warn!("Unexpected delivery collection shape: {}", other);
            return ActiveDeliveries::new();
        },
    };

    let mut active = ActiveDeliveries::new();
    for (key, value) in entries {
        let id = DeliveryId::new(key);
        match DeliveryRecord::from_value(&id, value) {
            Ok(record) if record.status.is_active() => {
                active.insert(id, record);
            },
            Ok(_) => {},
            Err(e) => warn!("Skipping delivery record: {}", e),
        }
    }
    active
}
