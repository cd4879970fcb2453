//! 配送在机器人侧的状态

use std::time::Duration;

use lalabot_protocol::{
    CompartmentId, DeliveryId, DeliveryRecord, ProgressStage, RoomIndex, Timestamp,
};

/// 取消原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// 取件确认超时
    PickupTimeout,
    /// 收件验证超时
    DropoffTimeout,
    /// 远端取消或记录被删除
    External,
}

impl CancelReason {
    /// 写入 `cancelReason` 的文本
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PickupTimeout => "pickup_timeout",
            Self::DropoffTimeout => "dropoff_timeout",
            Self::External => "cancelled_remotely",
        }
    }
}

/// 配送状态
///
/// ```text
/// Assigned → AtPickup → FilesConfirmed → InTransit → AtDestination → Completed
///               └──────────── Cancelled ◄───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    /// 已分配隔间，前往取件点
    Assigned,
    /// 在取件点等待确认
    AtPickup,
    /// 已取件，尚未出发
    FilesConfirmed,
    InTransit,
    /// 在目的地等待验证
    AtDestination,
    Completed,
    Cancelled(CancelReason),
}

impl DeliveryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled(_))
    }

    /// 是否还需要去取件点
    pub fn needs_pickup(self) -> bool {
        matches!(self, Self::Assigned | Self::AtPickup)
    }

    /// 物品是否在隔间中
    pub fn is_on_board(self) -> bool {
        matches!(
            self,
            Self::FilesConfirmed | Self::InTransit | Self::AtDestination
        )
    }

    /// 前进序号，终态最大
    pub fn rank(self) -> u8 {
        match self {
            Self::Assigned => 0,
            Self::AtPickup => 1,
            Self::FilesConfirmed => 2,
            Self::InTransit => 3,
            Self::AtDestination => 4,
            Self::Completed | Self::Cancelled(_) => 5,
        }
    }
}

/// 一次等待的截止时间与超时次数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitTimer {
    pub deadline: Option<Timestamp>,
    pub timeouts: u32,
}

impl WaitTimer {
    /// 截止时间是否已过（严格大于）
    pub fn expired(&self, now: Timestamp) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }
}

/// 确认等待策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// 单次等待时长
    pub confirm_timeout: Duration,
    /// 超时次数达到该值即取消
    pub max_retries: u32,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(60),
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: DeliveryId,
    pub pickup: RoomIndex,
    pub destination: RoomIndex,
    pub compartment: CompartmentId,
    pub receiver: String,
    pub state: DeliveryState,
    pub pickup_wait: WaitTimer,
    pub dropoff_wait: WaitTimer,
}

impl Delivery {
    /// 新分配的配送
    pub fn assigned(id: DeliveryId, record: &DeliveryRecord, compartment: CompartmentId) -> Self {
        Self {
            id,
            pickup: record.pickup,
            destination: record.destination,
            compartment,
            receiver: record.receiver.clone(),
            state: DeliveryState::Assigned,
            pickup_wait: WaitTimer::default(),
            dropoff_wait: WaitTimer::default(),
        }
    }

    /// 从远端 `in_progress` 记录恢复
    ///
    /// 进度阶段 0 视为尚未取件；之后的阶段视为物品已在隔间中，
    /// 机器人会重新前往目的地。
    pub fn resume(id: DeliveryId, record: &DeliveryRecord, compartment: CompartmentId) -> Self {
        let mut delivery = Self::assigned(id, record, compartment);
        if record.progress_stage > ProgressStage::Processing || record.files_confirmed {
            delivery.state = DeliveryState::FilesConfirmed;
        }
        delivery
    }

    /// 下一个需要前往的房间
    pub fn next_stop(&self) -> Option<RoomIndex> {
        if self.state.needs_pickup() {
            Some(self.pickup)
        } else if self.state.is_on_board() {
            Some(self.destination)
        } else {
            None
        }
    }

    /// 当前等待阶段的截止时间
    pub fn confirmation_deadline(&self) -> Option<Timestamp> {
        match self.state {
            DeliveryState::AtPickup => self.pickup_wait.deadline,
            DeliveryState::AtDestination => self.dropoff_wait.deadline,
            _ => None,
        }
    }

    /// 当前等待阶段的超时次数
    pub fn timeout_count(&self) -> u32 {
        match self.state {
            DeliveryState::Assigned | DeliveryState::AtPickup => self.pickup_wait.timeouts,
            _ => self.dropoff_wait.timeouts,
        }
    }
}
