//! # Lalabot HAL
//!
//! 硬件抽象层，为核心逻辑提供统一的执行器/传感器接口。
//!
//! ## 能力接口
//!
//! - [`MotorDriver`]: 双路直流电机（H 桥）
//! - [`ServoDriver`]: 三个隔间舵机
//! - [`Buzzer`]: 蜂鸣器
//! - [`DigitalSensor`]: 单路数字输入（红外循迹模块）
//! - [`DistanceSensor`]: 超声波测距
//!
//! ## 后端
//!
//! - [`sim`]: 仿真环形轨道（测试与离线运行）
//! - [`sysfs`]: `/sys/class/gpio` 与 `/sys/class/pwm`（只在 Linux 上有对应设备）
//!
//! 核心逻辑只依赖本模块的 trait，从不依赖具体后端。

use std::time::Duration;
use thiserror::Error;

use lalabot_protocol::CompartmentId;

pub mod hardware;
pub mod line;
pub mod sim;
pub mod sysfs;

pub use hardware::RobotHardware;
pub use line::{LineReading, LineSensors};
pub use sim::{SimConfig, SimHandle};
pub use sysfs::SysfsConfig;

/// HAL 统一错误类型
#[derive(Error, Debug)]
pub enum HalError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 启动时无法占用硬件资源（致命）
    #[error("Failed to claim {resource}: {source}")]
    Claim {
        resource: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Read timeout")]
    Timeout,

    /// 读数超出传感器有效量程
    #[error("Reading out of range: {0}")]
    OutOfRange(f32),

    #[error("Device Error: {0}")]
    Device(String),
}

impl HalError {
    /// 是否为启动阶段的致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, HalError::Claim { .. })
    }
}

/// 电机运动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    /// 原地左转（左轮后退，右轮前进）
    Left,
    /// 原地右转
    Right,
    Stop,
}

/// 隔间舵机位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompartmentState {
    Open,
    #[default]
    Closed,
}

/// 蜂鸣器报警节奏
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuzzerPattern {
    pub pulses: u32,
    pub on: Duration,
    pub off: Duration,
}

impl Default for BuzzerPattern {
    fn default() -> Self {
        Self {
            pulses: 20,
            on: Duration::from_millis(100),
            off: Duration::from_millis(100),
        }
    }
}

/// 双路电机驱动
pub trait MotorDriver: Send {
    /// 按方向与速度（0..=100 百分比）驱动
    fn drive(&mut self, direction: Direction, speed_percent: u8) -> Result<(), HalError>;

    fn stop(&mut self) -> Result<(), HalError> {
        self.drive(Direction::Stop, 0)
    }
}

/// 隔间舵机驱动
pub trait ServoDriver: Send {
    fn set_compartment(
        &mut self,
        id: CompartmentId,
        state: CompartmentState,
    ) -> Result<(), HalError>;

    /// 关闭全部隔间
    ///
    /// 逐个尝试，返回遇到的第一个错误。
    fn close_all(&mut self) -> Result<(), HalError> {
        let mut first_err = None;
        for id in CompartmentId::all() {
            if let Err(e) = self.set_compartment(id, CompartmentState::Closed) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// 蜂鸣器
///
/// `alarm` 不阻塞调用方；后端自行在后台完成节奏。
pub trait Buzzer: Send {
    fn alarm(&mut self, pattern: BuzzerPattern) -> Result<(), HalError>;
    fn silence(&mut self) -> Result<(), HalError>;
}

/// 单路数字输入
pub trait DigitalSensor: Send {
    /// 引脚当前是否为高电平
    fn is_active(&mut self) -> Result<bool, HalError>;
}

/// 测距传感器
pub trait DistanceSensor: Send {
    /// 读取距离（厘米）
    ///
    /// 超时或超出量程时返回错误，由调用方决定如何处理。
    fn read_distance_cm(&mut self) -> Result<f32, HalError>;
}
