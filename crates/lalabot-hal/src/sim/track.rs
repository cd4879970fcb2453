//! 仿真轨道状态
//!
//! 轨道被划分为 `N + 1` 段，每段起始处是该房间的浅色标记区，其余为黑线。
//! 机器人每收到一次非停止的驱动指令前进一步。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lalabot_protocol::{CompartmentId, RoomIndex, RoomRing};

use super::SimConfig;
use crate::{BuzzerPattern, CompartmentState, Direction, HalError, LineReading};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Obstacle {
    pub distance_cm: f32,
    /// 剩余可读次数，`None` 表示一直存在
    pub remaining_reads: Option<u32>,
}

pub(crate) struct TrackState {
    segments: u32,
    segment_steps: u32,
    marker_steps: u32,
    position: u32,
    noise: f64,
    rng: StdRng,
    free_distance_cm: f32,

    pub lifted: bool,
    pub line_override: Option<LineReading>,
    pub line_failure: bool,
    pub obstacle: Option<Obstacle>,
    pub distance_failure: bool,

    pub last_drive: Option<(Direction, u8)>,
    pub drive_count: u64,
    pub steps_moved: u64,

    pub compartments: [CompartmentState; CompartmentId::COUNT],
    pub servo_log: Vec<(CompartmentId, CompartmentState)>,
    pub buzzer: Option<BuzzerPattern>,
    pub alarm_count: u32,
}

impl TrackState {
    pub fn new(ring: RoomRing, config: &SimConfig) -> Self {
        let segment_steps = config.segment_steps.max(config.marker_steps + 2);
        let mut state = Self {
            segments: ring.size() as u32,
            segment_steps,
            marker_steps: config.marker_steps.max(1),
            position: 0,
            noise: config.noise.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(config.seed),
            free_distance_cm: config.free_distance_cm,
            lifted: false,
            line_override: None,
            line_failure: false,
            obstacle: None,
            distance_failure: false,
            last_drive: None,
            drive_count: 0,
            steps_moved: 0,
            compartments: [CompartmentState::Closed; CompartmentId::COUNT],
            servo_log: Vec::new(),
            buzzer: None,
            alarm_count: 0,
        };
        state.park_at(RoomRing::BASE);
        state
    }

    fn length(&self) -> u32 {
        self.segments * self.segment_steps
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    /// 停在某房间标记之后的黑线上
    pub fn park_at(&mut self, room: RoomIndex) {
        let room = room as u32 % self.segments;
        self.position = room * self.segment_steps + self.marker_steps;
    }

    /// 当前所在段对应的房间
    pub fn segment_room(&self) -> RoomIndex {
        (self.position / self.segment_steps) as RoomIndex
    }

    pub fn on_marker(&self) -> bool {
        self.position % self.segment_steps < self.marker_steps
    }

    pub fn drive(&mut self, direction: Direction, speed_percent: u8) {
        self.last_drive = Some((direction, speed_percent));
        self.drive_count += 1;
        if direction != Direction::Stop && speed_percent > 0 && !self.lifted {
            self.position = (self.position + 1) % self.length();
            self.steps_moved += 1;
        }
    }

    /// 无噪声的真实读数
    pub fn true_reading(&self) -> LineReading {
        if self.lifted {
            return LineReading::default();
        }
        if let Some(reading) = self.line_override {
            return reading;
        }
        if self.on_marker() {
            LineReading::default()
        } else {
            LineReading::new(false, true, false)
        }
    }

    /// 读取一路传感器（0 左、1 中、2 右），返回是否在黑线上
    pub fn sample_channel(&mut self, channel: usize) -> Result<bool, HalError> {
        if self.line_failure {
            return Err(HalError::Device(format!("line sensor {} not responding", channel)));
        }
        let reading = self.true_reading();
        let dark = match channel {
            0 => reading.left,
            1 => reading.center,
            _ => reading.right,
        };
        if self.noise > 0.0 && self.rng.gen_bool(self.noise) {
            Ok(!dark)
        } else {
            Ok(dark)
        }
    }

    pub fn read_distance(&mut self) -> Result<f32, HalError> {
        if self.distance_failure {
            return Err(HalError::Timeout);
        }
        match self.obstacle {
            Some(mut obstacle) => {
                let distance = obstacle.distance_cm;
                obstacle.remaining_reads = obstacle.remaining_reads.map(|n| n.saturating_sub(1));
                self.obstacle = match obstacle.remaining_reads {
                    Some(0) => None,
                    _ => Some(obstacle),
                };
                Ok(distance)
            }
            None => Ok(self.free_distance_cm),
        }
    }

    pub fn set_compartment(&mut self, id: CompartmentId, state: CompartmentState) {
        self.compartments[id.index()] = state;
        self.servo_log.push((id, state));
    }
}
