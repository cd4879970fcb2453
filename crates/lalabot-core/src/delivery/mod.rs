//! # 配送生命周期
//!
//! [`model`] 定义机器人侧的配送状态，[`machine`] 实现纯函数状态机。

pub mod machine;
pub mod model;

pub use machine::{DeliveryEvent, Effect, Transition};
pub use model::{CancelReason, Delivery, DeliveryPolicy, DeliveryState, WaitTimer};
