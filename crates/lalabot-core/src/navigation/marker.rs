//! 房间标记检测
//!
//! 标记是横跨轨道的浅色区域：三路传感器同时读到浅色。
//! 连续 `debounce` 次全白才确认一次经过；确认后锁存，
//! 直到连续 `debounce` 次离开浅色区才解除，保证每个物理标记只计数一次。

use lalabot_hal::LineReading;

#[derive(Debug, Clone)]
pub struct MarkerDetector {
    debounce: u32,
    light_run: u32,
    clear_run: u32,
    latched: bool,
}

impl MarkerDetector {
    pub fn new(debounce: u32) -> Self {
        Self {
            debounce: debounce.max(1),
            light_run: 0,
            clear_run: 0,
            latched: false,
        }
    }

    /// 输入一次采样，返回是否确认了一次新的标记经过
    pub fn observe(&mut self, reading: LineReading) -> bool {
        if reading.all_light() {
            self.light_run += 1;
            self.clear_run = 0;
            if !self.latched && self.light_run >= self.debounce {
                self.latched = true;
                return true;
            }
        } else {
            self.light_run = 0;
            if self.latched {
                self.clear_run += 1;
                if self.clear_run >= self.debounce {
                    self.latched = false;
                    self.clear_run = 0;
                }
            }
        }
        false
    }

    /// 已计数的标记尚未离开
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// 连续全白的采样数
    pub fn light_run(&self) -> u32 {
        self.light_run
    }
}
