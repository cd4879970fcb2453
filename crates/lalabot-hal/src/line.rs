//! 三路红外循迹传感器

use crate::{DigitalSensor, HalError};

/// 一次循迹采样，`true` 表示该路检测到黑线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LineReading {
    pub left: bool,
    pub center: bool,
    pub right: bool,
}

impl LineReading {
    pub const fn new(left: bool, center: bool, right: bool) -> Self {
        Self {
            left,
            center,
            right,
        }
    }

    /// 三路均为浅色（房间标记或离开地面）
    pub fn all_light(&self) -> bool {
        !self.left && !self.center && !self.right
    }

    pub fn all_dark(&self) -> bool {
        self.left && self.center && self.right
    }
}

impl From<(bool, bool, bool)> for LineReading {
    fn from((left, center, right): (bool, bool, bool)) -> Self {
        Self::new(left, center, right)
    }
}

/// 左/中/右三路传感器组合
pub struct LineSensors {
    left: Box<dyn DigitalSensor>,
    center: Box<dyn DigitalSensor>,
    right: Box<dyn DigitalSensor>,
    /// 模块在黑线上输出低电平
    active_low: bool,
}

impl LineSensors {
    pub fn new(
        left: Box<dyn DigitalSensor>,
        center: Box<dyn DigitalSensor>,
        right: Box<dyn DigitalSensor>,
        active_low: bool,
    ) -> Self {
        Self {
            left,
            center,
            right,
            active_low,
        }
    }

    /// 读取三路并换算为"是否在黑线上"
    pub fn read(&mut self) -> Result<LineReading, HalError> {
        let active_low = self.active_low;
        let convert = move |level: bool| level != active_low;
        let left = self.left.is_active()?;
        let center = self.center.is_active()?;
        let right = self.right.is_active()?;
        Ok(LineReading::new(convert(left), convert(center), convert(right)))
    }
}
