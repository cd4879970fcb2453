//! 核心层错误类型定义

use std::path::PathBuf;
use thiserror::Error;

use lalabot_hal::HalError;
use lalabot_protocol::{ProtocolError, RoomIndex};
use lalabot_store::StoreError;

/// 导航失败
#[derive(Error, Debug)]
pub enum NavigationError {
    /// 持续丢线
    #[error("Lost line for {ticks} ticks after room {room}")]
    LostLine { room: RoomIndex, ticks: u32 },

    /// 障碍物长时间未移除
    #[error("Path blocked for {ticks} ticks after room {room}")]
    Blocked { room: RoomIndex, ticks: u32 },

    /// 未能在限定 tick 数内到达
    #[error("Room {target} not reached within {ticks} ticks")]
    Stuck { target: RoomIndex, ticks: u32 },

    /// 收到停机请求
    #[error("Navigation cancelled by shutdown")]
    Cancelled,

    /// 传感器或电机故障
    #[error("Hardware error: {0}")]
    Hardware(#[from] HalError),

    /// 目标房间无效
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// 配置加载/校验错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 核心层统一错误类型
#[derive(Error, Debug)]
pub enum RobotError {
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl RobotError {
    /// 是否由停机请求引起
    pub fn is_shutdown(&self) -> bool {
        matches!(self, RobotError::Navigation(NavigationError::Cancelled))
    }
}
