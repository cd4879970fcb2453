//! `/sys/class/gpio` 引脚访问

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

use crate::HalError;

/// 引脚方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    /// 输出并设置初始电平
    Output { initial_high: bool },
}

impl PinDirection {
    fn as_sysfs(self) -> &'static str {
        match self {
            PinDirection::Input => "in",
            PinDirection::Output { initial_high: true } => "high",
            PinDirection::Output { initial_high: false } => "low",
        }
    }
}

/// 已导出的 GPIO 引脚
///
/// Drop 时取消导出。
#[derive(Debug)]
pub struct SysfsPin {
    root: PathBuf,
    pin: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// 导出并配置引脚
    pub fn claim(root: &Path, pin: u32, direction: PinDirection) -> Result<Self, HalError> {
        let claim_err = |source: io::Error| HalError::Claim {
            resource: format!("GPIO{}", pin),
            source,
        };

        let pin_dir = root.join(format!("gpio{}", pin));
        if !pin_dir.exists() {
            match fs::write(root.join("export"), pin.to_string()) {
                Ok(()) => {},
                // 已被导出
                Err(e) if e.kind() == ErrorKind::ResourceBusy => {},
                Err(e) => return Err(claim_err(e)),
            }
            wait_for(&pin_dir.join("direction")).map_err(claim_err)?;
        }

        fs::write(pin_dir.join("direction"), direction.as_sysfs()).map_err(claim_err)?;
        debug!("Claimed GPIO{} as {}", pin, direction.as_sysfs());

        Ok(Self {
            root: root.to_path_buf(),
            pin,
            value_path: pin_dir.join("value"),
        })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn set(&mut self, high: bool) -> Result<(), HalError> {
        fs::write(&self.value_path, if high { "1" } else { "0" })?;
        Ok(())
    }

    pub fn read(&self) -> Result<bool, HalError> {
        let raw = fs::read_to_string(&self.value_path)?;
        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(HalError::Device(format!(
                "GPIO{} returned unexpected value {:?}",
                self.pin, other
            ))),
        }
    }
}

impl Drop for SysfsPin {
    fn drop(&mut self) {
        if let Err(e) = fs::write(self.root.join("unexport"), self.pin.to_string()) {
            trace!("Failed to unexport GPIO{}: {}", self.pin, e);
        }
    }
}

/// 等待 udev 完成导出后的权限设置
fn wait_for(path: &Path) -> io::Result<()> {
    for _ in 0..20 {
        if path.exists() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(10));
    }
    Err(io::Error::new(
        ErrorKind::NotFound,
        format!("{} did not appear after export", path.display()),
    ))
}
