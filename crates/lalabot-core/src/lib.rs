//! # Lalabot Core
//!
//! 配送机器人的控制逻辑，只依赖 HAL 的 trait 与存储接口：
//!
//! - [`navigation`]: 循迹、标记计数、环形导航
//! - [`allocator`]: 隔间分配
//! - [`delivery`]: 配送状态机
//! - [`route`]: 两圈以内、先取后送的路线规划
//! - [`safety`]: 防盗与失联告警
//! - [`orchestrator`]: 主循环
//! - [`config`]: TOML 配置
//!
//! ## 示例
//!
//! ```no_run
//! use lalabot_core::{Orchestrator, RobotConfig, ShutdownFlag, SystemClock};
//! use lalabot_hal::sim;
//! use lalabot_store::MemoryStore;
//!
//! let config = RobotConfig::default();
//! let (hardware, _handle) = sim::build(config.ring(), &config.hardware.sim).unwrap();
//! let mut robot = Orchestrator::new(
//!     config.orchestrator_settings(),
//!     hardware,
//!     MemoryStore::new(),
//!     SystemClock,
//!     ShutdownFlag::new(),
//! );
//! robot.run();
//! ```

pub mod allocator;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod heartbeat;
pub mod navigation;
pub mod orchestrator;
pub mod route;
pub mod safety;
pub mod shutdown;

pub use allocator::CompartmentAllocator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HardwareBackend, RobotConfig, StoreBackend};
pub use delivery::{CancelReason, Delivery, DeliveryEvent, DeliveryPolicy, DeliveryState, Effect};
pub use error::{ConfigError, NavigationError, RobotError};
pub use heartbeat::ConnectionMonitor;
pub use navigation::{NavState, NavigationController, NavigationReport, NavigationSettings, RobotPose};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use route::{Route, Stop};
pub use safety::{SafetyMonitor, SafetySettings};
pub use shutdown::ShutdownFlag;
