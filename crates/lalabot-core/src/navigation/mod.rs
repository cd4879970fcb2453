//! # 循迹导航
//!
//! - [`decision`]：三路红外读数到运动决策的映射
//! - [`marker`]：房间标记的去抖与计数
//! - [`controller`]：沿环形轨道前进到目标房间

pub mod controller;
pub mod decision;
pub mod marker;

pub use controller::{NavState, NavigationController, NavigationReport, NavigationSettings, RobotPose};
pub use decision::{Correction, DriveSpeeds, LineFollower, Steering, decide};
pub use marker::MarkerDetector;
