//! 远端文档路径与字段名常量

/// 配送请求集合
pub const DELIVERY_REQUESTS: &str = "delivery_requests";
/// 已归档的配送记录
pub const DELIVERY_HISTORY: &str = "delivery_history";
/// 机器人状态文档
pub const ROBOT_STATUS: &str = "robot_status";
/// 安全告警列表
pub const SECURITY_ALERTS: &str = "security_alerts";
/// 错误上报列表
pub const ROBOT_ERRORS: &str = "robot_errors";

pub const STATUS: &str = "status";
pub const COMPARTMENT: &str = "compartment";
pub const PROGRESS_STAGE: &str = "progressStage";
pub const CURRENT_LOCATION: &str = "currentLocation";
/// 取件确认（发件人放入物品后置为 true）
pub const FILES_CONFIRMED: &str = "filesConfirmed";
/// 收件验证（收件人验证取件码后置为 true）
pub const CODE_VERIFIED: &str = "codeVerified";
pub const CONFIRMATION_DEADLINE: &str = "confirmationDeadline";
pub const READY_FOR_PICKUP: &str = "readyForPickup";
pub const CANCEL_REASON: &str = "cancelReason";
pub const CANCELLED_AT: &str = "cancelledAt";
pub const COMPLETED_AT: &str = "completedAt";

/// `robot_status` 中的行驶标志
pub const IS_MOVING: &str = "isMoving";

/// `robot_status` 下由操作员写入的告警复位标志
pub const ALARM_RESET: &str = "alarmReset";
