//! 环形导航控制器
//!
//! 状态：`Idle → Following → Arrived`，`Blocked` 为可重入子状态。
//! 位置只在确认经过标记时推进，从不推测。

use std::time::Duration;
use tracing::{debug, info, trace, warn};

use lalabot_hal::{Direction, LineReading, RobotHardware};
use lalabot_protocol::{RoomIndex, RoomRing};

use super::decision::{DriveSpeeds, LineFollower, Steering, decide};
use super::marker::MarkerDetector;
use crate::clock::Clock;
use crate::error::NavigationError;
use crate::shutdown::ShutdownFlag;

/// 导航参数
#[derive(Debug, Clone)]
pub struct NavigationSettings {
    pub ring: RoomRing,
    /// 距离不大于该值视为有障碍
    pub obstacle_threshold_cm: f32,
    pub marker_debounce: u32,
    /// 连续丢线 tick 上限
    pub max_lost_ticks: u32,
    /// 连续全白 tick 上限（超过视为丢线）
    pub max_marker_ticks: u32,
    /// 障碍持续 tick 上限
    pub max_blocked_ticks: u32,
    /// 每经过一个房间允许的 tick 数
    pub max_ticks_per_room: u32,
    pub speeds: DriveSpeeds,
    pub tick: Duration,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            ring: RoomRing::default(),
            obstacle_threshold_cm: 20.0,
            marker_debounce: 3,
            max_lost_ticks: 25,
            max_marker_ticks: 150,
            max_blocked_ticks: 1_500,
            max_ticks_per_room: 3_000,
            speeds: DriveSpeeds { drive: 70, turn: 50 },
            tick: Duration::from_millis(20),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Idle,
    Following,
    Blocked,
    Arrived,
}

/// 机器人位姿
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotPose {
    pub current_room: RoomIndex,
    pub is_moving: bool,
}

/// 一次导航的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigationReport {
    pub markers_passed: u8,
    pub ticks: u32,
    pub blocked_ticks: u32,
}

pub struct NavigationController {
    settings: NavigationSettings,
    pose: RobotPose,
    state: NavState,
    follower: LineFollower,
    /// 跨越多次导航保留，中途停在标记上时不会重复计数
    marker: MarkerDetector,
}

impl NavigationController {
    /// 机器人从基站出发
    pub fn new(settings: NavigationSettings) -> Self {
        let follower = LineFollower::new(settings.speeds);
        let marker = MarkerDetector::new(settings.marker_debounce);
        Self {
            settings,
            pose: RobotPose {
                current_room: RoomRing::BASE,
                is_moving: false,
            },
            state: NavState::Idle,
            follower,
            marker,
        }
    }

    pub fn settings(&self) -> &NavigationSettings {
        &self.settings
    }

    pub fn pose(&self) -> RobotPose {
        self.pose
    }

    pub fn current_room(&self) -> RoomIndex {
        self.pose.current_room
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn read_sensors(&self, hardware: &mut RobotHardware) -> Result<LineReading, NavigationError> {
        Ok(hardware.line.read()?)
    }

    /// 前方是否无障碍
    ///
    /// 测距失败或超时视为无障碍。
    pub fn is_obstacle_clear(&self, hardware: &mut RobotHardware, threshold_cm: f32) -> bool {
        match hardware.distance.read_distance_cm() {
            Ok(distance) => distance > threshold_cm,
            Err(e) => {
                trace!("Distance reading unavailable ({}), assuming clear", e);
                true
            },
        }
    }

    /// 沿前进方向行驶到目标房间
    ///
    /// 每确认经过一个标记调用一次 `on_room`，参数为新的当前房间。
    /// 无论成功与否，返回前都会停止电机。
    pub fn navigate_to<C, F>(
        &mut self,
        hardware: &mut RobotHardware,
        target: RoomIndex,
        clock: &C,
        shutdown: &ShutdownFlag,
        on_room: F,
    ) -> Result<NavigationReport, NavigationError>
    where
        C: Clock + ?Sized,
        F: FnMut(RoomIndex),
    {
        let target = self.settings.ring.check(target)?;
        let distance = self
            .settings
            .ring
            .forward_distance(self.pose.current_room, target);
        if distance == 0 {
            self.stop(hardware)?;
            self.state = NavState::Arrived;
            return Ok(NavigationReport::default());
        }

        info!(
            "Navigating room {} -> {} ({} markers)",
            self.pose.current_room, target, distance
        );
        self.state = NavState::Following;
        self.pose.is_moving = true;

        let result = self.follow(hardware, target, distance, clock, shutdown, on_room);

        if let Err(e) = hardware.motors.stop() {
            warn!("Failed to stop motors after navigation: {}", e);
        }
        self.pose.is_moving = false;

        match &result {
            Ok(report) => {
                self.state = NavState::Arrived;
                info!("Arrived at room {} after {} ticks", target, report.ticks);
            },
            Err(e) => {
                self.state = NavState::Idle;
                warn!("Navigation to room {} failed: {}", target, e);
            },
        }
        result
    }

    fn follow<C, F>(
        &mut self,
        hardware: &mut RobotHardware,
        target: RoomIndex,
        distance: u8,
        clock: &C,
        shutdown: &ShutdownFlag,
        mut on_room: F,
    ) -> Result<NavigationReport, NavigationError>
    where
        C: Clock + ?Sized,
        F: FnMut(RoomIndex),
    {
        let settings = self.settings.clone();
        let budget = settings.max_ticks_per_room.saturating_mul(distance as u32);
        let mut report = NavigationReport::default();
        let mut lost_ticks = 0u32;
        let mut blocked_run = 0u32;

        loop {
            if shutdown.is_requested() {
                return Err(NavigationError::Cancelled);
            }

            if !self.is_obstacle_clear(hardware, settings.obstacle_threshold_cm) {
                if self.state != NavState::Blocked {
                    info!("Obstacle ahead after room {}, stopping", self.pose.current_room);
                    self.state = NavState::Blocked;
                }
                hardware.motors.stop()?;
                blocked_run += 1;
                report.blocked_ticks += 1;
                if blocked_run > settings.max_blocked_ticks {
                    return Err(NavigationError::Blocked {
                        room: self.pose.current_room,
                        ticks: blocked_run,
                    });
                }
                clock.sleep(settings.tick);
                continue;
            }
            if self.state == NavState::Blocked {
                info!("Path clear, resuming");
                self.state = NavState::Following;
                blocked_run = 0;
            }

            if report.ticks >= budget {
                return Err(NavigationError::Stuck {
                    target,
                    ticks: report.ticks,
                });
            }
            report.ticks += 1;

            let reading = self.read_sensors(hardware)?;
            if self.marker.observe(reading) {
                report.markers_passed += 1;
                self.pose.current_room = settings.ring.next(self.pose.current_room);
                info!("Passed room {}", self.pose.current_room);
                on_room(self.pose.current_room);
            }

            // 最后一个标记离开浅色区后停车
            if report.markers_passed >= distance && !self.marker.is_latched() {
                return Ok(report);
            }

            let steering = decide(reading);
            match steering {
                Steering::Defer if self.marker.light_run() > settings.max_marker_ticks => {
                    return Err(NavigationError::LostLine {
                        room: self.pose.current_room,
                        ticks: self.marker.light_run(),
                    });
                },
                Steering::Stopped => {
                    lost_ticks += 1;
                    debug!("Line lost ({}/{})", lost_ticks, settings.max_lost_ticks);
                    if lost_ticks > settings.max_lost_ticks {
                        return Err(NavigationError::LostLine {
                            room: self.pose.current_room,
                            ticks: lost_ticks,
                        });
                    }
                },
                _ => lost_ticks = 0,
            }

            let (direction, speed) = self.follower.command(steering);
            trace!("{:?} -> {:?} @ {}%", reading, direction, speed);
            hardware.motors.drive(direction, speed)?;
            clock.sleep(settings.tick);
        }
    }

    /// 立即停止电机
    pub fn stop(&mut self, hardware: &mut RobotHardware) -> Result<(), NavigationError> {
        self.pose.is_moving = false;
        if self.state != NavState::Arrived {
            self.state = NavState::Idle;
        }
        hardware.motors.drive(Direction::Stop, 0)?;
        Ok(())
    }
}
