//! 防盗与失联监测
//!
//! 仅在机器人静止时检查：三路传感器持续读到浅色说明机器人被抬离轨道。
//! 告警一旦触发即锁存，只能由操作员复位。

use std::time::Duration;
use tracing::{debug, warn};

use lalabot_hal::LineReading;
use lalabot_protocol::{AlertKind, Timestamp};

use crate::heartbeat::ConnectionMonitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetySettings {
    /// 离线持续超过该值触发告警（严格大于）
    pub off_line_threshold: Duration,
    /// 失联检查的最小间隔
    pub connectivity_check_interval: Duration,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            off_line_threshold: Duration::from_secs(3),
            connectivity_check_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyMonitor {
    settings: SafetySettings,
    off_line: Duration,
    alarm: Option<AlertKind>,
    last_connectivity_check: Option<Timestamp>,
}

impl SafetyMonitor {
    pub fn new(settings: SafetySettings) -> Self {
        Self {
            settings,
            off_line: Duration::ZERO,
            alarm: None,
            last_connectivity_check: None,
        }
    }

    /// 采样一次循迹读数
    ///
    /// `interval` 为距上次采样的时间。返回本次新触发的告警。
    pub fn check_off_line(
        &mut self,
        reading: LineReading,
        is_moving: bool,
        interval: Duration,
    ) -> Option<AlertKind> {
        if is_moving || !reading.all_light() {
            self.off_line = Duration::ZERO;
            return None;
        }

        self.off_line += interval;
        if self.alarm.is_some() || self.off_line <= self.settings.off_line_threshold {
            return None;
        }
        warn!(
            "Robot off the line for {:?} while stationary",
            self.off_line
        );
        self.trigger(AlertKind::TheftAttempt)
    }

    /// 检查与远端存储的连通性
    pub fn check_connectivity(
        &mut self,
        monitor: &ConnectionMonitor,
        now: Timestamp,
    ) -> Option<AlertKind> {
        if let Some(last) = self.last_connectivity_check
            && now.saturating_duration_since(last) < self.settings.connectivity_check_interval
        {
            return None;
        }
        self.last_connectivity_check = Some(now);

        if self.alarm.is_some() || monitor.is_connected(now) {
            return None;
        }
        warn!(
            "No successful store call for {:?}",
            monitor.time_since_last_success(now)
        );
        self.trigger(AlertKind::ConnectivityLost)
    }

    fn trigger(&mut self, kind: AlertKind) -> Option<AlertKind> {
        self.alarm = Some(kind);
        Some(kind)
    }

    /// 操作员复位
    pub fn disable_alarm(&mut self) {
        if let Some(kind) = self.alarm.take() {
            debug!("Alarm {:?} cleared", kind);
        }
        self.off_line = Duration::ZERO;
    }

    pub fn alarm_active(&self) -> bool {
        self.alarm.is_some()
    }

    pub fn alarm_kind(&self) -> Option<AlertKind> {
        self.alarm
    }

    pub fn off_line_duration(&self) -> Duration {
        self.off_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LIGHT: LineReading = LineReading::new(false, false, false);
    const LINE: LineReading = LineReading::new(false, true, false);
    const TICK: Duration = Duration::from_millis(500);

    fn monitor() -> SafetyMonitor {
        SafetyMonitor::new(SafetySettings::default())
    }

    #[test]
    fn test_triggers_strictly_after_threshold() {
        let mut safety = monitor();
        for _ in 0..6 {
            assert_eq!(safety.check_off_line(LIGHT, false, TICK), None);
        }
        assert_eq!(safety.off_line_duration(), Duration::from_secs(3));
        assert_eq!(
            safety.check_off_line(LIGHT, false, TICK),
            Some(AlertKind::TheftAttempt)
        );
        assert!(safety.alarm_active());
    }

    #[test]
    fn test_alarm_is_latched() {
        let mut safety = monitor();
        for _ in 0..7 {
            safety.check_off_line(LIGHT, false, TICK);
        }
        for _ in 0..10 {
            assert_eq!(safety.check_off_line(LIGHT, false, TICK), None);
        }
        safety.check_off_line(LINE, false, TICK);
        assert!(safety.alarm_active());

        safety.disable_alarm();
        assert!(!safety.alarm_active());
        assert_eq!(safety.off_line_duration(), Duration::ZERO);
    }

    #[test]
    fn test_line_contact_resets_duration() {
        let mut safety = monitor();
        for _ in 0..5 {
            safety.check_off_line(LIGHT, false, TICK);
        }
        safety.check_off_line(LINE, false, TICK);
        for _ in 0..6 {
            assert_eq!(safety.check_off_line(LIGHT, false, TICK), None);
        }
    }

    #[test]
    fn test_never_triggers_while_moving() {
        let mut safety = monitor();
        for _ in 0..100 {
            assert_eq!(safety.check_off_line(LIGHT, true, TICK), None);
        }
        assert_eq!(safety.off_line_duration(), Duration::ZERO);
    }

    #[test]
    fn test_connectivity_loss() {
        let start = Timestamp::from_millis(1_000_000);
        let connection = ConnectionMonitor::new(start, Duration::from_secs(30));
        let mut safety = monitor();

        assert_eq!(safety.check_connectivity(&connection, start), None);
        // 间隔内不重复检查
        let late = start + Duration::from_secs(31);
        assert_eq!(
            safety.check_connectivity(&connection, start + Duration::from_secs(5)),
            None
        );
        assert_eq!(
            safety.check_connectivity(&connection, late),
            Some(AlertKind::ConnectivityLost)
        );
        assert_eq!(safety.alarm_kind(), Some(AlertKind::ConnectivityLost));

        // 已告警时离线检查不再触发
        for _ in 0..10 {
            assert_eq!(safety.check_off_line(LIGHT, false, TICK), None);
        }
    }

    #[test]
    fn test_connectivity_within_bound() {
        let start = Timestamp::from_millis(1_000_000);
        let connection = ConnectionMonitor::new(start, Duration::from_secs(30));
        let mut safety = monitor();
        connection.register_success(start + Duration::from_secs(20));
        assert_eq!(
            safety.check_connectivity(&connection, start + Duration::from_secs(45)),
            None
        );
    }

    proptest! {
        #[test]
        fn prop_triggers_iff_threshold_exceeded(
            samples in prop::collection::vec((any::<bool>(), any::<bool>()), 0..60)
        ) {
            let mut safety = monitor();
            let mut run = Duration::ZERO;
            for (light, moving) in samples {
                let was_active = safety.alarm_active();
                let reading = if light { LIGHT } else { LINE };
                let fired = safety.check_off_line(reading, moving, TICK);
                run = if light && !moving { run + TICK } else { Duration::ZERO };

                if moving {
                    prop_assert!(fired.is_none());
                }
                let expected = !was_active && run > SafetySettings::default().off_line_threshold;
                prop_assert_eq!(fired.is_some(), expected);
                prop_assert!(!was_active || safety.alarm_active());
            }
        }
    }
}
