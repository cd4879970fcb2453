//! 环形轨道房间模型
//!
//! 轨道是固定的环形序列：`0 (基站) → 1 → … → N → 0`。
//! 机器人只能沿前进方向行驶，因此两点之间的"距离"即需要经过的标记数量。

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// 房间编号（0 表示基站）
pub type RoomIndex = u8;

/// 支持的最大房间数（不含基站）
pub const MAX_ROOMS: u8 = 4;

/// 环形轨道
///
/// # 示例
///
/// ```
/// use lalabot_protocol::RoomRing;
///
/// let ring = RoomRing::new(4).unwrap();
/// assert_eq!(ring.size(), 5);
/// assert_eq!(ring.forward_distance(3, 1), 3);
/// assert_eq!(ring.next(4), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRing {
    room_count: u8,
}

impl RoomRing {
    /// 基站编号
    pub const BASE: RoomIndex = 0;

    /// 创建环形轨道
    ///
    /// `room_count` 为基站以外的房间数量（1..=4）。
    pub fn new(room_count: u8) -> Result<Self, ProtocolError> {
        if room_count == 0 || room_count > MAX_ROOMS {
            return Err(ProtocolError::InvalidRoomCount(room_count));
        }
        Ok(Self { room_count })
    }

    /// 基站以外的房间数量（N）
    pub fn room_count(&self) -> u8 {
        self.room_count
    }

    /// 环上的位置总数（N + 1）
    pub fn size(&self) -> u8 {
        self.room_count + 1
    }

    /// 编号是否位于环上
    pub fn contains(&self, room: RoomIndex) -> bool {
        room <= self.room_count
    }

    /// 校验编号
    pub fn check(&self, room: RoomIndex) -> Result<RoomIndex, ProtocolError> {
        if self.contains(room) {
            Ok(room)
        } else {
            Err(ProtocolError::RoomOutOfRange {
                room,
                max: self.room_count,
            })
        }
    }

    /// 前向距离：`(to - from) mod (N + 1)`
    ///
    /// 结果总在 `[0, N]` 范围内，且 `forward_distance(x, x) == 0`。
    pub fn forward_distance(&self, from: RoomIndex, to: RoomIndex) -> u8 {
        let size = self.size() as i16;
        ((to as i16 - from as i16).rem_euclid(size)) as u8
    }

    /// 前进方向上的下一个房间
    pub fn next(&self, room: RoomIndex) -> RoomIndex {
        (room + 1) % self.size()
    }

    /// 前进方向上的上一个房间
    pub fn previous(&self, room: RoomIndex) -> RoomIndex {
        (room + self.room_count) % self.size()
    }

    /// 从 `from` 出发按前向距离排列的全部房间（包含 `from` 自身）
    pub fn rooms_from(&self, from: RoomIndex) -> impl Iterator<Item = RoomIndex> + '_ {
        (0..self.size()).map(move |offset| (from + offset) % self.size())
    }
}

impl Default for RoomRing {
    fn default() -> Self {
        Self {
            room_count: MAX_ROOMS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_forward_distance_wraps() {
        let ring = RoomRing::new(4).unwrap();
        assert_eq!(ring.forward_distance(0, 2), 2);
        assert_eq!(ring.forward_distance(2, 4), 2);
        assert_eq!(ring.forward_distance(4, 0), 1);
        assert_eq!(ring.forward_distance(3, 1), 3);
        assert_eq!(ring.forward_distance(1, 0), 4);
    }

    #[test]
    fn test_next_and_previous() {
        let ring = RoomRing::new(3).unwrap();
        assert_eq!(ring.next(3), 0);
        assert_eq!(ring.previous(0), 3);
        assert_eq!(ring.previous(ring.next(2)), 2);
    }

    #[test]
    fn test_invalid_room_count() {
        assert_eq!(RoomRing::new(0), Err(ProtocolError::InvalidRoomCount(0)));
        assert_eq!(RoomRing::new(5), Err(ProtocolError::InvalidRoomCount(5)));
    }

    #[test]
    fn test_check_rejects_out_of_range() {
        let ring = RoomRing::new(2).unwrap();
        assert_eq!(ring.check(2), Ok(2));
        assert!(matches!(
            ring.check(3),
            Err(ProtocolError::RoomOutOfRange { room: 3, max: 2 })
        ));
    }

    #[test]
    fn test_rooms_from_orders_by_distance() {
        let ring = RoomRing::new(4).unwrap();
        let order: Vec<_> = ring.rooms_from(3).collect();
        assert_eq!(order, vec![3, 4, 0, 1, 2]);
    }

    proptest! {
        #[test]
        fn prop_forward_distance_bounded(n in 1u8..=4, a in 0u8..=4, b in 0u8..=4) {
            let ring = RoomRing::new(n).unwrap();
            let a = a % ring.size();
            let b = b % ring.size();
            let d = ring.forward_distance(a, b);
            prop_assert!(d <= n);
            prop_assert_eq!(ring.forward_distance(a, a), 0);
            // 沿前进方向走 d 步必然到达目标
            let mut room = a;
            for _ in 0..d {
                room = ring.next(room);
            }
            prop_assert_eq!(room, b);
        }
    }
}
