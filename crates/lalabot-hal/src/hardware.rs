//! 硬件资源集合
//!
//! 启动时一次性获取，所有退出路径上由 `Drop` 恢复安全状态：
//! 电机停止、隔间关闭、蜂鸣器静音。

use tracing::{info, warn};

use crate::{Buzzer, DistanceSensor, HalError, LineSensors, MotorDriver, ServoDriver};

pub struct RobotHardware {
    pub motors: Box<dyn MotorDriver>,
    pub servos: Box<dyn ServoDriver>,
    pub buzzer: Box<dyn Buzzer>,
    pub line: LineSensors,
    pub distance: Box<dyn DistanceSensor>,
}

impl RobotHardware {
    pub fn new(
        motors: Box<dyn MotorDriver>,
        servos: Box<dyn ServoDriver>,
        buzzer: Box<dyn Buzzer>,
        line: LineSensors,
        distance: Box<dyn DistanceSensor>,
    ) -> Self {
        Self {
            motors,
            servos,
            buzzer,
            line,
            distance,
        }
    }

    /// 进入安全状态
    ///
    /// 三个动作都会执行，返回第一个错误。
    pub fn safe_state(&mut self) -> Result<(), HalError> {
        let motors = self.motors.stop();
        let servos = self.servos.close_all();
        let buzzer = self.buzzer.silence();
        motors.and(servos).and(buzzer)
    }
}

impl Drop for RobotHardware {
    fn drop(&mut self) {
        match self.safe_state() {
            Ok(()) => info!("Hardware released in safe state"),
            Err(e) => warn!("Failed to reach safe state while releasing hardware: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::{self, SimConfig};
    use crate::{CompartmentState, Direction};
    use lalabot_protocol::{CompartmentId, RoomRing};

    #[test]
    fn test_drop_restores_safe_state() {
        let (mut hardware, handle) = sim::build(RoomRing::default(), &SimConfig::default()).unwrap();
        let id = CompartmentId::new(2).unwrap();
        hardware.servos.set_compartment(id, CompartmentState::Open).unwrap();
        hardware.motors.drive(Direction::Forward, 60).unwrap();
        hardware.buzzer.alarm(Default::default()).unwrap();

        drop(hardware);

        assert_eq!(handle.compartment(id), CompartmentState::Closed);
        assert_eq!(handle.last_drive(), Some((Direction::Stop, 0)));
        assert!(!handle.buzzer_sounding());
    }
}
