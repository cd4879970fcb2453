//! # 仿真后端
//!
//! 在内存中模拟环形轨道、电机、舵机、蜂鸣器与传感器，
//! 并通过 [`SimHandle`] 向测试暴露状态查询与故障注入。
//!
//! 仿真红外模块与实物一致：在黑线上输出低电平。

mod track;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use lalabot_protocol::{CompartmentId, RoomIndex, RoomRing};

use crate::{
    Buzzer, BuzzerPattern, CompartmentState, DigitalSensor, Direction, DistanceSensor, HalError,
    LineReading, LineSensors, MotorDriver, RobotHardware, ServoDriver,
};
use track::{Obstacle, TrackState};

/// 仿真轨道参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// 每段轨道的步数（含标记区）
    pub segment_steps: u32,
    /// 标记区步数
    pub marker_steps: u32,
    /// 每次采样单路翻转的概率
    pub noise: f64,
    pub seed: u64,
    /// 无障碍时的测距读数
    pub free_distance_cm: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            segment_steps: 40,
            marker_steps: 6,
            noise: 0.0,
            seed: 7,
            free_distance_cm: 200.0,
        }
    }
}

/// 构建仿真硬件
///
/// 机器人初始停在基站标记之后的黑线上。
pub fn build(ring: RoomRing, config: &SimConfig) -> Result<(RobotHardware, SimHandle), HalError> {
    let state = Arc::new(Mutex::new(TrackState::new(ring, config)));
    let channel = |index| -> Box<dyn DigitalSensor> {
        Box::new(SimLineChannel {
            state: state.clone(),
            index,
        })
    };
    let line = LineSensors::new(channel(0), channel(1), channel(2), true);

    let hardware = RobotHardware::new(
        Box::new(SimMotors {
            state: state.clone(),
        }),
        Box::new(SimServos {
            state: state.clone(),
        }),
        Box::new(SimBuzzer {
            state: state.clone(),
        }),
        line,
        Box::new(SimRanger {
            state: state.clone(),
        }),
    );
    info!(
        "Simulated track ready: {} rooms, {} steps per segment",
        ring.room_count(),
        config.segment_steps
    );
    Ok((hardware, SimHandle { state }))
}

/// 仿真状态句柄（可克隆，跨线程共享）
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<TrackState>>,
}

impl SimHandle {
    /// 轨道上的位置（步）
    pub fn position(&self) -> u32 {
        self.state.lock().position()
    }

    /// 当前所在段对应的房间
    pub fn segment_room(&self) -> RoomIndex {
        self.state.lock().segment_room()
    }

    pub fn on_marker(&self) -> bool {
        self.state.lock().on_marker()
    }

    /// 把机器人放到某房间标记之后
    pub fn park_at(&self, room: RoomIndex) {
        self.state.lock().park_at(room);
    }

    /// 抬起/放下机器人
    pub fn lift(&self, lifted: bool) {
        self.state.lock().lifted = lifted;
    }

    /// 固定循迹读数（`None` 恢复轨道读数）
    pub fn override_line(&self, reading: Option<LineReading>) {
        self.state.lock().line_override = reading;
    }

    pub fn fail_line_sensors(&self, failed: bool) {
        self.state.lock().line_failure = failed;
    }

    /// 放置障碍物，`reads` 次读取后自动移除
    pub fn place_obstacle(&self, distance_cm: f32, reads: Option<u32>) {
        self.state.lock().obstacle = Some(Obstacle {
            distance_cm,
            remaining_reads: reads,
        });
    }

    pub fn clear_obstacle(&self) {
        self.state.lock().obstacle = None;
    }

    pub fn fail_distance_sensor(&self, failed: bool) {
        self.state.lock().distance_failure = failed;
    }

    pub fn compartment(&self, id: CompartmentId) -> CompartmentState {
        self.state.lock().compartments[id.index()]
    }

    /// 舵机动作记录
    pub fn servo_log(&self) -> Vec<(CompartmentId, CompartmentState)> {
        self.state.lock().servo_log.clone()
    }

    pub fn last_drive(&self) -> Option<(Direction, u8)> {
        self.state.lock().last_drive
    }

    pub fn drive_count(&self) -> u64 {
        self.state.lock().drive_count
    }

    pub fn steps_moved(&self) -> u64 {
        self.state.lock().steps_moved
    }

    pub fn buzzer_sounding(&self) -> bool {
        self.state.lock().buzzer.is_some()
    }

    /// 报警被触发的次数
    pub fn alarm_count(&self) -> u32 {
        self.state.lock().alarm_count
    }
}

struct SimMotors {
    state: Arc<Mutex<TrackState>>,
}

impl MotorDriver for SimMotors {
    fn drive(&mut self, direction: Direction, speed_percent: u8) -> Result<(), HalError> {
        self.state.lock().drive(direction, speed_percent.min(100));
        Ok(())
    }
}

struct SimServos {
    state: Arc<Mutex<TrackState>>,
}

impl ServoDriver for SimServos {
    fn set_compartment(
        &mut self,
        id: CompartmentId,
        state: CompartmentState,
    ) -> Result<(), HalError> {
        debug!("Sim compartment {} -> {:?}", id, state);
        self.state.lock().set_compartment(id, state);
        Ok(())
    }
}

struct SimBuzzer {
    state: Arc<Mutex<TrackState>>,
}

impl Buzzer for SimBuzzer {
    fn alarm(&mut self, pattern: BuzzerPattern) -> Result<(), HalError> {
        let mut state = self.state.lock();
        state.buzzer = Some(pattern);
        state.alarm_count += 1;
        Ok(())
    }

    fn silence(&mut self) -> Result<(), HalError> {
        self.state.lock().buzzer = None;
        Ok(())
    }
}

struct SimLineChannel {
    state: Arc<Mutex<TrackState>>,
    index: usize,
}

impl DigitalSensor for SimLineChannel {
    fn is_active(&mut self) -> Result<bool, HalError> {
        // 低电平 = 黑线
        self.state.lock().sample_channel(self.index).map(|dark| !dark)
    }
}

struct SimRanger {
    state: Arc<Mutex<TrackState>>,
}

impl DistanceSensor for SimRanger {
    fn read_distance_cm(&mut self) -> Result<f32, HalError> {
        self.state.lock().read_distance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_default() -> (RobotHardware, SimHandle) {
        build(RoomRing::default(), &SimConfig::default()).unwrap()
    }

    #[test]
    fn test_line_sensors_see_line_through_active_low_channels() {
        let (mut hardware, _handle) = build_default();
        assert_eq!(hardware.line.read().unwrap(), LineReading::new(false, true, false));
    }

    #[test]
    fn test_lift_reads_all_light() {
        let (mut hardware, handle) = build_default();
        handle.lift(true);
        assert!(hardware.line.read().unwrap().all_light());
        handle.lift(false);
        assert!(!hardware.line.read().unwrap().all_light());
    }

    #[test]
    fn test_distance_failure_injection() {
        let (mut hardware, handle) = build_default();
        assert_eq!(hardware.distance.read_distance_cm().unwrap(), 200.0);
        handle.fail_distance_sensor(true);
        assert!(matches!(hardware.distance.read_distance_cm(), Err(HalError::Timeout)));
    }

    #[test]
    fn test_line_failure_injection() {
        let (mut hardware, handle) = build_default();
        handle.fail_line_sensors(true);
        assert!(hardware.line.read().is_err());
    }

    #[test]
    fn test_servos_and_buzzer_are_recorded() {
        let (mut hardware, handle) = build_default();
        let id = CompartmentId::new(1).unwrap();
        hardware.servos.set_compartment(id, CompartmentState::Open).unwrap();
        hardware.servos.close_all().unwrap();
        assert_eq!(handle.servo_log().len(), 4);
        assert_eq!(handle.compartment(id), CompartmentState::Closed);

        hardware.buzzer.alarm(BuzzerPattern::default()).unwrap();
        assert!(handle.buzzer_sounding());
        assert_eq!(handle.alarm_count(), 1);
        hardware.buzzer.silence().unwrap();
        assert!(!handle.buzzer_sounding());
    }

    #[test]
    fn test_noise_is_deterministic_per_seed() {
        let config = SimConfig {
            noise: 0.3,
            seed: 42,
            ..SimConfig::default()
        };
        let sample = |config: &SimConfig| {
            let (mut hardware, _handle) = build(RoomRing::default(), config).unwrap();
            (0..50)
                .map(|_| hardware.line.read().unwrap())
                .collect::<Vec<_>>()
        };
        let first = sample(&config);
        assert_eq!(first, sample(&config));
        assert!(first.iter().any(|r| *r != LineReading::new(false, true, false)));
    }
}
