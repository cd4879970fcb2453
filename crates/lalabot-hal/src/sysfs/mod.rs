//! # Linux sysfs 后端
//!
//! 适用于树莓派等通过 `/sys/class/gpio`、`/sys/class/pwm` 暴露外设的平台。
//!
//! ## 接线（默认值）
//!
//! | 外设 | 引脚 |
//! |------|------|
//! | TB6612 PWMA / AIN1 / AIN2 | pwmchip0 通道 0（GPIO12）/ 24 / 23 |
//! | TB6612 PWMB / BIN1 / BIN2 | pwmchip0 通道 1（GPIO13）/ 27 / 22 |
//! | TB6612 STBY | 25 |
//! | 红外 左 / 中 / 右 | 5 / 6 / 26 |
//! | HC-SR04 TRIG / ECHO | 20 / 21 |
//! | 蜂鸣器 | 16 |
//! | 舵机 | pwmchip2 通道 0 / 1 / 2（PCA9685） |
//!
//! 任一资源占用失败都会使 [`build`] 返回 [`HalError::Claim`]，启动随即中止。

pub mod gpio;
pub mod pwm;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use lalabot_protocol::CompartmentId;

use crate::{
    Buzzer, BuzzerPattern, CompartmentState, DigitalSensor, Direction, DistanceSensor, HalError,
    LineSensors, MotorDriver, RobotHardware, ServoDriver,
};
use gpio::{PinDirection, SysfsPin};
use pwm::{MOTOR_PERIOD, PwmChannel, SERVO_PERIOD};

/// 声速换算：距离(cm) = 往返时间(s) × 34300 / 2
const CM_PER_ECHO_SECOND: f32 = 17_150.0;
const MIN_RANGE_CM: f32 = 2.0;
const MAX_RANGE_CM: f32 = 400.0;

/// sysfs 后端引脚配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysfsConfig {
    pub gpio_root: PathBuf,
    pub pwm_root: PathBuf,

    /// PWMA / PWMB 所在的硬件 PWM 控制器
    pub motor_pwm_chip: u32,
    pub motor_pwm_channels: [u32; 2],
    pub ain1: u32,
    pub ain2: u32,
    pub bin1: u32,
    pub bin2: u32,
    pub stby: u32,

    pub ir_left: u32,
    pub ir_center: u32,
    pub ir_right: u32,

    pub trig: u32,
    pub echo: u32,
    pub echo_timeout_ms: u64,

    pub buzzer: u32,

    pub servo_pwm_chip: u32,
    /// 隔间 1..=3 对应的 PWM 通道
    pub servo_channels: [u32; CompartmentId::COUNT],
    pub servo_closed_deg: u16,
    pub servo_open_deg: u16,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from("/sys/class/gpio"),
            pwm_root: PathBuf::from("/sys/class/pwm"),
            motor_pwm_chip: 0,
            motor_pwm_channels: [0, 1],
            ain1: 24,
            ain2: 23,
            bin1: 27,
            bin2: 22,
            stby: 25,
            ir_left: 5,
            ir_center: 6,
            ir_right: 26,
            trig: 20,
            echo: 21,
            echo_timeout_ms: 100,
            buzzer: 16,
            servo_pwm_chip: 2,
            servo_channels: [0, 1, 2],
            servo_closed_deg: 90,
            servo_open_deg: 180,
        }
    }
}

/// 占用全部外设并构建硬件集合
pub fn build(config: &SysfsConfig, line_active_low: bool) -> Result<RobotHardware, HalError> {
    let gpio = config.gpio_root.as_path();
    let output = PinDirection::Output {
        initial_high: false,
    };

    let [pwma, pwmb] = config.motor_pwm_channels;
    let motor_channel = |channel| {
        PwmChannel::claim(&config.pwm_root, config.motor_pwm_chip, channel, MOTOR_PERIOD)
    };
    let motors = Tb6612Motors {
        pwma: motor_channel(pwma)?,
        ain1: SysfsPin::claim(gpio, config.ain1, output)?,
        ain2: SysfsPin::claim(gpio, config.ain2, output)?,
        pwmb: motor_channel(pwmb)?,
        bin1: SysfsPin::claim(gpio, config.bin1, output)?,
        bin2: SysfsPin::claim(gpio, config.bin2, output)?,
        stby: SysfsPin::claim(
            gpio,
            config.stby,
            PinDirection::Output { initial_high: true },
        )?,
    };

    let mut channels = Vec::with_capacity(CompartmentId::COUNT);
    for channel in config.servo_channels {
        channels.push(PwmChannel::claim(
            &config.pwm_root,
            config.servo_pwm_chip,
            channel,
            SERVO_PERIOD,
        )?);
    }
    let mut servos = SysfsServos {
        channels,
        closed_deg: config.servo_closed_deg,
        open_deg: config.servo_open_deg,
    };
    servos.close_all()?;

    let buzzer = SysfsBuzzer {
        pin: Arc::new(Mutex::new(SysfsPin::claim(gpio, config.buzzer, output)?)),
        stop: Arc::new(AtomicBool::new(false)),
        worker: None,
    };

    let input = |pin| -> Result<Box<dyn DigitalSensor>, HalError> {
        Ok(Box::new(SysfsInput {
            pin: SysfsPin::claim(gpio, pin, PinDirection::Input)?,
        }))
    };
    let line = LineSensors::new(
        input(config.ir_left)?,
        input(config.ir_center)?,
        input(config.ir_right)?,
        line_active_low,
    );

    let ranger = Hcsr04 {
        trig: SysfsPin::claim(gpio, config.trig, output)?,
        echo: SysfsPin::claim(gpio, config.echo, PinDirection::Input)?,
        timeout: Duration::from_millis(config.echo_timeout_ms),
    };

    info!("sysfs hardware claimed (gpio: {})", gpio.display());
    Ok(RobotHardware::new(
        Box::new(motors),
        Box::new(servos),
        Box::new(buzzer),
        line,
        Box::new(ranger),
    ))
}

/// TB6612FNG 双路 H 桥
///
/// 左电机反向安装。PWMA/PWMB 为 1kHz 硬件 PWM，占空比即速度百分比。
///
/// | 方向 | AIN1 | AIN2 | BIN1 | BIN2 |
/// |------|------|------|------|------|
/// | Forward | 0 | 1 | 1 | 0 |
/// | Left    | 1 | 0 | 1 | 0 |
/// | Right   | 0 | 1 | 0 | 1 |
/// | Stop    | PWMA = PWMB = 0% ||||
struct Tb6612Motors {
    pwma: PwmChannel,
    ain1: SysfsPin,
    ain2: SysfsPin,
    pwmb: PwmChannel,
    bin1: SysfsPin,
    bin2: SysfsPin,
    stby: SysfsPin,
}

impl MotorDriver for Tb6612Motors {
    fn drive(&mut self, direction: Direction, speed_percent: u8) -> Result<(), HalError> {
        let (a, b) = match direction {
            Direction::Forward => ((false, true), (true, false)),
            Direction::Left => ((true, false), (true, false)),
            Direction::Right => ((false, true), (false, true)),
            Direction::Stop => {
                self.pwma.set_duty_percent(0)?;
                return self.pwmb.set_duty_percent(0);
            },
        };
        if speed_percent == 0 {
            return self.drive(Direction::Stop, 0);
        }
        self.ain1.set(a.0)?;
        self.ain2.set(a.1)?;
        self.bin1.set(b.0)?;
        self.bin2.set(b.1)?;
        self.pwma.set_duty_percent(speed_percent)?;
        self.pwmb.set_duty_percent(speed_percent)
    }
}

impl Drop for Tb6612Motors {
    fn drop(&mut self) {
        let _ = self.drive(Direction::Stop, 0);
        let _ = self.stby.set(false);
    }
}

struct SysfsServos {
    channels: Vec<PwmChannel>,
    closed_deg: u16,
    open_deg: u16,
}

impl ServoDriver for SysfsServos {
    fn set_compartment(
        &mut self,
        id: CompartmentId,
        state: CompartmentState,
    ) -> Result<(), HalError> {
        let angle = match state {
            CompartmentState::Open => self.open_deg,
            CompartmentState::Closed => self.closed_deg,
        };
        let channel = self
            .channels
            .get_mut(id.index())
            .ok_or_else(|| HalError::Device(format!("no servo channel for compartment {}", id)))?;
        debug!("Compartment {} -> {:?} ({}°)", id, state, angle);
        channel.set_angle(angle)
    }
}

/// 蜂鸣器，报警节奏在后台线程中执行
struct SysfsBuzzer {
    pin: Arc<Mutex<SysfsPin>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Buzzer for SysfsBuzzer {
    fn alarm(&mut self, pattern: BuzzerPattern) -> Result<(), HalError> {
        self.silence()?;
        self.stop.store(false, Ordering::Release);

        let pin = self.pin.clone();
        let stop = self.stop.clone();
        let worker = thread::Builder::new()
            .name("lalabot-buzzer".into())
            .spawn(move || {
                for _ in 0..pattern.pulses {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(e) = pin.lock().set(true) {
                        warn!("Buzzer write failed: {}", e);
                        break;
                    }
                    thread::sleep(pattern.on);
                    let _ = pin.lock().set(false);
                    thread::sleep(pattern.off);
                }
            })?;
        self.worker = Some(worker);
        Ok(())
    }

    fn silence(&mut self) -> Result<(), HalError> {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.pin.lock().set(false)
    }
}

struct SysfsInput {
    pin: SysfsPin,
}

impl DigitalSensor for SysfsInput {
    fn is_active(&mut self) -> Result<bool, HalError> {
        self.pin.read()
    }
}

/// HC-SR04 超声波测距
struct Hcsr04 {
    trig: SysfsPin,
    echo: SysfsPin,
    timeout: Duration,
}

impl Hcsr04 {
    /// 等待 ECHO 变为指定电平，返回变化时刻
    fn wait_for_level(&self, level: bool) -> Result<Instant, HalError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let now = Instant::now();
            if self.echo.read()? == level {
                return Ok(now);
            }
            if now > deadline {
                return Err(HalError::Timeout);
            }
        }
    }
}

impl DistanceSensor for Hcsr04 {
    fn read_distance_cm(&mut self) -> Result<f32, HalError> {
        self.trig.set(false)?;
        thread::sleep(Duration::from_micros(10));
        self.trig.set(true)?;
        thread::sleep(Duration::from_micros(10));
        self.trig.set(false)?;

        let start = self.wait_for_level(true)?;
        let end = self.wait_for_level(false)?;
        let distance = end.duration_since(start).as_secs_f32() * CM_PER_ECHO_SECOND;

        if (MIN_RANGE_CM..=MAX_RANGE_CM).contains(&distance) {
            Ok(distance)
        } else {
            Err(HalError::OutOfRange(distance))
        }
    }
}
