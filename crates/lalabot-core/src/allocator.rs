//! 隔间分配
//!
//! 三个隔间最多同时服务三单配送。分配总是取编号最小的空闲隔间，
//! 同一配送在释放前始终绑定同一隔间。

use lalabot_protocol::{CompartmentId, DeliveryId};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct CompartmentAllocator {
    slots: [Option<DeliveryId>; CompartmentId::COUNT],
}

impl CompartmentAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为配送分配隔间
    ///
    /// 已绑定的配送返回原隔间；全部占用时返回 `None`。
    pub fn assign(&mut self, delivery: &DeliveryId) -> Option<CompartmentId> {
        if let Some(existing) = self.compartment_of(delivery) {
            return Some(existing);
        }
        let free = CompartmentId::all().find(|c| self.slots[c.index()].is_none())?;
        self.slots[free.index()] = Some(delivery.clone());
        debug!("Compartment {} assigned to {}", free, delivery);
        Some(free)
    }

    /// 绑定指定隔间（恢复远端已有的分配）
    ///
    /// 隔间已被其他配送占用时返回 `false`。
    pub fn claim(&mut self, delivery: &DeliveryId, compartment: CompartmentId) -> bool {
        match &self.slots[compartment.index()] {
            Some(owner) => owner == delivery,
            None => {
                if self.compartment_of(delivery).is_some() {
                    return false;
                }
                self.slots[compartment.index()] = Some(delivery.clone());
                true
            },
        }
    }

    /// 释放隔间，可重复调用
    pub fn release(&mut self, compartment: CompartmentId) {
        if let Some(owner) = self.slots[compartment.index()].take() {
            debug!("Compartment {} released from {}", compartment, owner);
        }
    }

    pub fn compartment_of(&self, delivery: &DeliveryId) -> Option<CompartmentId> {
        CompartmentId::all().find(|c| self.slots[c.index()].as_ref() == Some(delivery))
    }

    /// 空闲隔间数量
    pub fn available(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    /// 各隔间当前绑定的配送（下标 0 对应隔间 1）
    pub fn occupancy(&self) -> [Option<DeliveryId>; CompartmentId::COUNT] {
        self.slots.clone()
    }
}
