//! `/sys/class/pwm` 通道：舵机脉宽与电机调速

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::HalError;

/// 舵机信号周期（50Hz）
pub const SERVO_PERIOD: Duration = Duration::from_millis(20);

/// 电机调速周期（1kHz）
pub const MOTOR_PERIOD: Duration = Duration::from_millis(1);

/// 0° 与 180° 对应的脉宽（SG90）
const PULSE_MIN_NS: u64 = 500_000;
const PULSE_MAX_NS: u64 = 2_500_000;

#[derive(Debug)]
pub struct PwmChannel {
    chip_dir: PathBuf,
    channel: u32,
    dir: PathBuf,
    period_ns: u64,
}

impl PwmChannel {
    /// 导出通道，占空比清零后设置周期并使能
    pub fn claim(
        root: &Path,
        chip: u32,
        channel: u32,
        period: Duration,
    ) -> Result<Self, HalError> {
        let chip_dir = root.join(format!("pwmchip{}", chip));
        let dir = chip_dir.join(format!("pwm{}", channel));
        let claim_err = |source| HalError::Claim {
            resource: format!("pwmchip{}/pwm{}", chip, channel),
            source,
        };

        if !dir.exists() {
            match fs::write(chip_dir.join("export"), channel.to_string()) {
                Ok(()) => {},
                Err(e) if e.kind() == ErrorKind::ResourceBusy => {},
                Err(e) => return Err(claim_err(e)),
            }
        }
        let period_ns = period.as_nanos() as u64;
        // 占空比不能大于周期，先清零
        fs::write(dir.join("duty_cycle"), "0").map_err(claim_err)?;
        fs::write(dir.join("period"), period_ns.to_string()).map_err(claim_err)?;
        fs::write(dir.join("enable"), "1").map_err(claim_err)?;
        debug!("Claimed pwmchip{}/pwm{} (period {}ns)", chip, channel, period_ns);

        Ok(Self {
            chip_dir,
            channel,
            dir,
            period_ns,
        })
    }

    /// 转到指定角度（0..=180）
    pub fn set_angle(&mut self, degrees: u16) -> Result<(), HalError> {
        self.set_duty_ns(pulse_for_angle(degrees))
    }

    /// 按百分比设置占空比，超过 100 按 100 处理
    pub fn set_duty_percent(&mut self, percent: u8) -> Result<(), HalError> {
        self.set_duty_ns(duty_for_percent(self.period_ns, percent))
    }

    fn set_duty_ns(&mut self, duty_ns: u64) -> Result<(), HalError> {
        fs::write(self.dir.join("duty_cycle"), duty_ns.min(self.period_ns).to_string())?;
        Ok(())
    }
}

impl Drop for PwmChannel {
    fn drop(&mut self) {
        let _ = fs::write(self.dir.join("enable"), "0");
        let _ = fs::write(self.chip_dir.join("unexport"), self.channel.to_string());
    }
}

/// 角度对应的脉宽（纳秒）
pub fn pulse_for_angle(degrees: u16) -> u64 {
    let degrees = degrees.min(180) as u64;
    PULSE_MIN_NS + (PULSE_MAX_NS - PULSE_MIN_NS) * degrees / 180
}

/// 百分比对应的高电平时间（纳秒）
pub fn duty_for_percent(period_ns: u64, percent: u8) -> u64 {
    period_ns * percent.min(100) as u64 / 100
}
