//! # 机器人配置
//!
//! TOML 文件，所有字段都有默认值，缺省的段落或字段使用默认配置。
//!
//! ```toml
//! [ring]
//! room_count = 4
//!
//! [store]
//! backend = "firebase"
//!
//! [store.firebase]
//! base_url = "https://lalabot-default-rtdb.firebaseio.com"
//!
//! [hardware]
//! backend = "sysfs"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use lalabot_hal::{BuzzerPattern, SimConfig, SysfsConfig};
use lalabot_protocol::RoomRing;
use lalabot_protocol::room::MAX_ROOMS;
use lalabot_store::FirebaseConfig;

use crate::delivery::DeliveryPolicy;
use crate::error::ConfigError;
use crate::navigation::{DriveSpeeds, NavigationSettings};
use crate::orchestrator::OrchestratorSettings;
use crate::safety::SafetySettings;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RobotConfig {
    pub ring: RingConfig,
    pub timing: TimingConfig,
    pub delivery: DeliveryConfig,
    pub navigation: NavigationConfig,
    pub safety: SafetyConfig,
    pub store: StoreConfig,
    pub hardware: HardwareConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// 基站以外的房间数量
    pub room_count: u8,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            room_count: MAX_ROOMS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// 主循环与等待循环的 tick
    pub tick_ms: u64,
    /// 导航循环的 tick
    pub nav_tick_ms: u64,
    /// 出错后的退避时间
    pub error_backoff_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 500,
            nav_tick_ms: 20,
            error_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub confirm_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_secs: 60,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub obstacle_threshold_cm: f32,
    pub marker_debounce: u32,
    pub max_lost_ticks: u32,
    pub max_marker_ticks: u32,
    pub max_blocked_ticks: u32,
    pub max_ticks_per_room: u32,
    pub drive_speed_percent: u8,
    pub turn_speed_percent: u8,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            obstacle_threshold_cm: 20.0,
            marker_debounce: 3,
            max_lost_ticks: 25,
            max_marker_ticks: 150,
            max_blocked_ticks: 1_500,
            max_ticks_per_room: 3_000,
            drive_speed_percent: 70,
            turn_speed_percent: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub off_line_threshold_ms: u64,
    pub connectivity_bound_secs: u64,
    pub connectivity_check_interval_secs: u64,
    pub buzzer_pulses: u32,
    pub buzzer_on_ms: u64,
    pub buzzer_off_ms: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            off_line_threshold_ms: 3_000,
            connectivity_bound_secs: 30,
            connectivity_check_interval_secs: 10,
            buzzer_pulses: 20,
            buzzer_on_ms: 100,
            buzzer_off_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储
    #[default]
    Memory,
    Firebase,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub firebase: FirebaseConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareBackend {
    #[default]
    Sim,
    Sysfs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub backend: HardwareBackend,
    /// 红外模块在黑线上输出低电平
    pub line_active_low: bool,
    pub sim: SimConfig,
    pub sysfs: SysfsConfig,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: HardwareBackend::Sim,
            line_active_low: true,
            sim: SimConfig::default(),
            sysfs: SysfsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 额外的日志过滤指令，如 `"debug"` 或 `"lalabot_core=trace"`
    pub level: Option<String>,
}

impl RobotConfig {
    /// 从文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check(ok: bool, message: &str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::Invalid(message.to_string()))
            }
        }

        RoomRing::new(self.ring.room_count)
            .map_err(|e| ConfigError::Invalid(format!("ring.room_count: {}", e)))?;

        check(self.timing.tick_ms > 0, "timing.tick_ms must be positive")?;
        check(self.timing.nav_tick_ms > 0, "timing.nav_tick_ms must be positive")?;

        check(
            self.delivery.confirm_timeout_secs > 0,
            "delivery.confirm_timeout_secs must be positive",
        )?;
        check(self.delivery.max_retries > 0, "delivery.max_retries must be at least 1")?;

        let nav = &self.navigation;
        check(
            nav.obstacle_threshold_cm.is_finite() && nav.obstacle_threshold_cm > 0.0,
            "navigation.obstacle_threshold_cm must be positive",
        )?;
        check(nav.marker_debounce > 0, "navigation.marker_debounce must be at least 1")?;
        check(
            nav.max_marker_ticks >= nav.marker_debounce,
            "navigation.max_marker_ticks must not be below marker_debounce",
        )?;
        check(
            nav.max_ticks_per_room > 0,
            "navigation.max_ticks_per_room must be positive",
        )?;
        check(
            (1..=100).contains(&nav.drive_speed_percent),
            "navigation.drive_speed_percent must be within 1..=100",
        )?;
        check(
            (1..=100).contains(&nav.turn_speed_percent),
            "navigation.turn_speed_percent must be within 1..=100",
        )?;

        check(
            self.safety.off_line_threshold_ms > 0,
            "safety.off_line_threshold_ms must be positive",
        )?;
        check(
            self.safety.connectivity_bound_secs > 0,
            "safety.connectivity_bound_secs must be positive",
        )?;

        if self.store.backend == StoreBackend::Firebase {
            check(
                !self.store.firebase.base_url.trim().is_empty(),
                "store.firebase.base_url is required for the firebase backend",
            )?;
            check(
                self.store.firebase.timeout_ms > 0,
                "store.firebase.timeout_ms must be positive",
            )?;
        }

        let sim = &self.hardware.sim;
        check(
            sim.marker_steps > 0 && sim.segment_steps > sim.marker_steps,
            "hardware.sim.segment_steps must exceed marker_steps",
        )?;
        check(
            (0.0..=1.0).contains(&sim.noise),
            "hardware.sim.noise must be within 0..=1",
        )?;

        if let Some(level) = &self.logging.level {
            check(!level.trim().is_empty(), "logging.level must not be empty")?;
        }
        Ok(())
    }

    /// 环形轨道
    ///
    /// 未校验的配置中房间数无效时退回默认值。
    pub fn ring(&self) -> RoomRing {
        RoomRing::new(self.ring.room_count).unwrap_or_default()
    }

    pub fn navigation_settings(&self) -> NavigationSettings {
        let nav = &self.navigation;
        NavigationSettings {
            ring: self.ring(),
            obstacle_threshold_cm: nav.obstacle_threshold_cm,
            marker_debounce: nav.marker_debounce,
            max_lost_ticks: nav.max_lost_ticks,
            max_marker_ticks: nav.max_marker_ticks,
            max_blocked_ticks: nav.max_blocked_ticks,
            max_ticks_per_room: nav.max_ticks_per_room,
            speeds: DriveSpeeds {
                drive: nav.drive_speed_percent,
                turn: nav.turn_speed_percent,
            },
            tick: Duration::from_millis(self.timing.nav_tick_ms),
        }
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            confirm_timeout: Duration::from_secs(self.delivery.confirm_timeout_secs),
            max_retries: self.delivery.max_retries,
        }
    }

    pub fn safety_settings(&self) -> SafetySettings {
        SafetySettings {
            off_line_threshold: Duration::from_millis(self.safety.off_line_threshold_ms),
            connectivity_check_interval: Duration::from_secs(
                self.safety.connectivity_check_interval_secs,
            ),
        }
    }

    pub fn buzzer_pattern(&self) -> BuzzerPattern {
        BuzzerPattern {
            pulses: self.safety.buzzer_pulses,
            on: Duration::from_millis(self.safety.buzzer_on_ms),
            off: Duration::from_millis(self.safety.buzzer_off_ms),
        }
    }

    /// 汇总编排器所需的全部参数
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            navigation: self.navigation_settings(),
            policy: self.delivery_policy(),
            safety: self.safety_settings(),
            buzzer: self.buzzer_pattern(),
            tick: Duration::from_millis(self.timing.tick_ms),
            error_backoff: Duration::from_millis(self.timing.error_backoff_ms),
            connectivity_bound: Duration::from_secs(self.safety.connectivity_bound_secs),
        }
    }
}
