//! 配送状态机
//!
//! 纯函数：输入当前状态、事件与时间，输出下一状态和副作用列表。
//! 副作用由编排器按顺序执行。

use serde_json::{Map, Value};
use tracing::{debug, info};

use lalabot_protocol::{CompartmentId, DeliveryStatus, ProgressStage, Timestamp, fields};

use super::model::{CancelReason, Delivery, DeliveryPolicy, DeliveryState, WaitTimer};

/// 驱动状态机的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEvent {
    /// 到达取件房间
    ArrivedAtPickup,
    /// 开始新一段导航
    Departed,
    /// 距目的地还有一个标记
    Approaching,
    ArrivedAtDestination,
    /// 一次轮询的远端标志
    Poll { confirmed: bool, verified: bool },
    /// 远端取消或记录消失
    Cancel,
}

/// 状态迁移的副作用
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenCompartment(CompartmentId),
    CloseCompartment(CompartmentId),
    ReleaseCompartment(CompartmentId),
    /// 写入远端记录字段
    PatchRecord(Map<String, Value>),
    /// 把记录移入历史
    Archive {
        status: DeliveryStatus,
        reason: Option<CancelReason>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub delivery: Delivery,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn ignored(delivery: &Delivery) -> Self {
        Self {
            delivery: delivery.clone(),
            effects: Vec::new(),
        }
    }
}

fn patch<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn stage(stage: ProgressStage) -> Value {
    Value::from(u8::from(stage))
}

fn millis(ts: Timestamp) -> Value {
    Value::from(ts.as_millis())
}

impl Delivery {
    /// 计算事件作用后的迁移
    pub fn step(&self, event: DeliveryEvent, now: Timestamp, policy: &DeliveryPolicy) -> Transition {
        use DeliveryEvent as E;
        use DeliveryState as S;

        if self.state.is_terminal() {
            return Transition::ignored(self);
        }

        let mut next = self.clone();
        let c = self.compartment;
        let effects = match (self.state, event) {
            (_, E::Cancel) => {
                info!("Delivery {} cancelled remotely", self.id);
                next.state = S::Cancelled(CancelReason::External);
                vec![Effect::CloseCompartment(c), Effect::ReleaseCompartment(c)]
            },

            (S::Assigned | S::AtPickup, E::ArrivedAtPickup) => {
                let deadline = now + policy.confirm_timeout;
                if self.state == S::Assigned {
                    next.pickup_wait = WaitTimer::default();
                }
                next.pickup_wait.deadline = Some(deadline);
                next.state = S::AtPickup;
                info!(
                    "Delivery {}: waiting for items in compartment {} at room {}",
                    self.id, c, self.pickup
                );
                vec![
                    Effect::OpenCompartment(c),
                    Effect::PatchRecord(patch([
                        (fields::CURRENT_LOCATION, Value::from(self.pickup)),
                        (fields::FILES_CONFIRMED, Value::Bool(false)),
                        (fields::CONFIRMATION_DEADLINE, millis(deadline)),
                    ])),
                ]
            },

            (S::AtPickup, E::Poll { confirmed: true, .. }) => {
                info!("Delivery {}: items confirmed", self.id);
                next.state = S::FilesConfirmed;
                next.pickup_wait.deadline = None;
                vec![
                    Effect::CloseCompartment(c),
                    Effect::PatchRecord(patch([(
                        fields::PROGRESS_STAGE,
                        stage(ProgressStage::InTransit),
                    )])),
                ]
            },

            (S::AtPickup, E::Poll { .. }) if self.pickup_wait.expired(now) => {
                next.pickup_wait.timeouts += 1;
                timeout_effects(&mut next, now, policy, CancelReason::PickupTimeout)
            },

            (S::FilesConfirmed, E::Departed) => {
                debug!("Delivery {} in transit", self.id);
                next.state = S::InTransit;
                Vec::new()
            },

            (S::InTransit, E::Approaching) => vec![Effect::PatchRecord(patch([(
                fields::PROGRESS_STAGE,
                stage(ProgressStage::Approaching),
            )]))],

            (S::FilesConfirmed | S::InTransit | S::AtDestination, E::ArrivedAtDestination) => {
                let deadline = now + policy.confirm_timeout;
                if self.state != S::AtDestination {
                    next.dropoff_wait = WaitTimer::default();
                }
                next.dropoff_wait.deadline = Some(deadline);
                next.state = S::AtDestination;
                info!(
                    "Delivery {}: ready for {} in compartment {} at room {}",
                    self.id, self.receiver, c, self.destination
                );
                vec![
                    Effect::OpenCompartment(c),
                    Effect::PatchRecord(patch([
                        (fields::PROGRESS_STAGE, stage(ProgressStage::Arrived)),
                        (fields::READY_FOR_PICKUP, Value::Bool(true)),
                        (fields::CURRENT_LOCATION, Value::from(self.destination)),
                        (fields::CONFIRMATION_DEADLINE, millis(deadline)),
                    ])),
                ]
            },

            (S::AtDestination, E::Poll { verified: true, .. }) => {
                info!("Delivery {} completed", self.id);
                next.state = S::Completed;
                next.dropoff_wait.deadline = None;
                vec![
                    Effect::CloseCompartment(c),
                    Effect::ReleaseCompartment(c),
                    Effect::PatchRecord(patch([
                        (
                            fields::STATUS,
                            Value::from(DeliveryStatus::Completed.as_str()),
                        ),
                        (fields::COMPLETED_AT, millis(now)),
                    ])),
                    Effect::Archive {
                        status: DeliveryStatus::Completed,
                        reason: None,
                    },
                ]
            },

            (S::AtDestination, E::Poll { .. }) if self.dropoff_wait.expired(now) => {
                next.dropoff_wait.timeouts += 1;
                timeout_effects(&mut next, now, policy, CancelReason::DropoffTimeout)
            },

            _ => return Transition::ignored(self),
        };

        Transition {
            delivery: next,
            effects,
        }
    }
}

/// 超时计数已加一之后：重试或取消
fn timeout_effects(
    next: &mut Delivery,
    now: Timestamp,
    policy: &DeliveryPolicy,
    reason: CancelReason,
) -> Vec<Effect> {
    let c = next.compartment;
    let timer = match reason {
        CancelReason::PickupTimeout => &mut next.pickup_wait,
        _ => &mut next.dropoff_wait,
    };

    if timer.timeouts >= policy.max_retries {
        timer.deadline = None;
        info!(
            "Delivery {} cancelled after {} timeouts ({})",
            next.id,
            timer.timeouts,
            reason.as_str()
        );
        next.state = DeliveryState::Cancelled(reason);
        return vec![
            Effect::CloseCompartment(c),
            Effect::ReleaseCompartment(c),
            Effect::PatchRecord(patch([
                (
                    fields::STATUS,
                    Value::from(DeliveryStatus::Cancelled.as_str()),
                ),
                (fields::CANCEL_REASON, Value::from(reason.as_str())),
                (fields::CANCELLED_AT, millis(now)),
            ])),
            Effect::Archive {
                status: DeliveryStatus::Cancelled,
                reason: Some(reason),
            },
        ];
    }

    let deadline = now + policy.confirm_timeout;
    timer.deadline = Some(deadline);
    info!(
        "Delivery {}: wait timed out ({}/{}), extending",
        next.id, timer.timeouts, policy.max_retries
    );
    vec![Effect::PatchRecord(patch([(
        fields::CONFIRMATION_DEADLINE,
        millis(deadline),
    )]))]
}
