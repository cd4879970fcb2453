//! 路线规划
//!
//! 机器人只能沿一个方向绕环行驶。按距当前房间的前向距离对停靠点排序，
//! 同一房间先取件后送件。若某配送的目的地在本圈中先于取件点到达，
//! 它的送件任务推迟到第二圈，因此任何路线都不超过两圈。

use std::collections::BTreeMap;

use lalabot_protocol::{DeliveryId, RoomIndex, RoomRing};

use crate::delivery::Delivery;

/// 一个停靠点的任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stop {
    pub room: RoomIndex,
    /// 从出发点算起的累计前向距离
    pub offset: u16,
    pub pickups: Vec<DeliveryId>,
    pub dropoffs: Vec<DeliveryId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    stops: Vec<Stop>,
}

impl Route {
    /// 为活动配送规划路线
    pub fn plan<'a>(
        ring: &RoomRing,
        current: RoomIndex,
        deliveries: impl IntoIterator<Item = &'a Delivery>,
    ) -> Self {
        let size = ring.size() as u16;
        let mut stops: BTreeMap<u16, Stop> = BTreeMap::new();

        for delivery in deliveries {
            let drop = ring.forward_distance(current, delivery.destination) as u16;
            if delivery.state.needs_pickup() {
                let pick = ring.forward_distance(current, delivery.pickup) as u16;
                stop_at(&mut stops, current, size, pick).pickups.push(delivery.id.clone());
                let drop = if drop < pick { drop + size } else { drop };
                stop_at(&mut stops, current, size, drop).dropoffs.push(delivery.id.clone());
            } else if delivery.state.is_on_board() {
                stop_at(&mut stops, current, size, drop).dropoffs.push(delivery.id.clone());
            }
        }

        Self {
            stops: stops.into_values().collect(),
        }
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn first(&self) -> Option<&Stop> {
        self.stops.first()
    }

    /// 走完整条路线需要经过的标记数
    pub fn total_distance(&self) -> u16 {
        self.stops.last().map_or(0, |stop| stop.offset)
    }
}

fn stop_at(stops: &mut BTreeMap<u16, Stop>, current: RoomIndex, size: u16, offset: u16) -> &mut Stop {
    stops.entry(offset).or_insert_with(|| Stop {
        room: ((current as u16 + offset) % size) as RoomIndex,
        offset,
        pickups: Vec::new(),
        dropoffs: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryState;
    use lalabot_protocol::{CompartmentId, DeliveryRecord};
    use proptest::prelude::*;

    fn delivery(id: &str, pickup: RoomIndex, destination: RoomIndex, state: DeliveryState) -> Delivery {
        let mut d = Delivery::assigned(
            id.into(),
            &DeliveryRecord::new(pickup, destination, "r"),
            CompartmentId::new(1).unwrap(),
        );
        d.state = state;
        d
    }

    fn rooms(route: &Route) -> Vec<(RoomIndex, u16)> {
        route.stops().iter().map(|s| (s.room, s.offset)).collect()
    }

    #[test]
    fn test_single_delivery_forward() {
        let ring = RoomRing::default();
        let d = delivery("a", 2, 4, DeliveryState::Assigned);
        let route = Route::plan(&ring, 0, [&d]);
        assert_eq!(rooms(&route), vec![(2, 2), (4, 4)]);
        assert_eq!(route.stops()[0].pickups, vec![DeliveryId::from("a")]);
        assert_eq!(route.stops()[1].dropoffs, vec![DeliveryId::from("a")]);
    }

    #[test]
    fn test_dropoff_behind_pickup_goes_to_second_pass() {
        let ring = RoomRing::default();
        let d = delivery("a", 3, 1, DeliveryState::Assigned);
        let route = Route::plan(&ring, 0, [&d]);
        assert_eq!(rooms(&route), vec![(3, 3), (1, 6)]);
        assert_eq!(route.total_distance(), 6);
    }

    #[test]
    fn test_groups_tasks_by_room() {
        let ring = RoomRing::default();
        let a = delivery("a", 1, 3, DeliveryState::Assigned);
        let b = delivery("b", 3, 4, DeliveryState::AtPickup);
        let c = delivery("c", 0, 3, DeliveryState::InTransit);
        let route = Route::plan(&ring, 1, [&a, &b, &c]);
        assert_eq!(rooms(&route), vec![(1, 0), (3, 2), (4, 3)]);

        let third = &route.stops()[1];
        assert_eq!(third.pickups, vec![DeliveryId::from("b")]);
        assert_eq!(
            third.dropoffs,
            vec![DeliveryId::from("a"), DeliveryId::from("c")]
        );
    }

    #[test]
    fn test_same_room_pickup_and_dropoff_share_stop() {
        let ring = RoomRing::default();
        let d = delivery("a", 2, 2, DeliveryState::Assigned);
        let route = Route::plan(&ring, 0, [&d]);
        assert_eq!(route.stops().len(), 1);
        assert_eq!(route.stops()[0].pickups.len(), 1);
        assert_eq!(route.stops()[0].dropoffs.len(), 1);
    }

    #[test]
    fn test_terminal_deliveries_are_skipped() {
        let ring = RoomRing::default();
        let d = delivery("a", 2, 3, DeliveryState::Completed);
        let route = Route::plan(&ring, 0, [&d]);
        assert!(route.first().is_none());
        assert_eq!(route.total_distance(), 0);
    }

    fn state() -> impl Strategy<Value = DeliveryState> {
        prop_oneof![
            Just(DeliveryState::Assigned),
            Just(DeliveryState::AtPickup),
            Just(DeliveryState::FilesConfirmed),
            Just(DeliveryState::InTransit),
            Just(DeliveryState::AtDestination),
        ]
    }

    proptest! {
        #[test]
        fn prop_pickup_precedes_dropoff_within_two_loops(
            rooms in 1u8..=4,
            current in 0u8..=4,
            specs in prop::collection::vec((0u8..=4, 0u8..=4, state()), 0..3),
        ) {
            let ring = RoomRing::new(rooms).unwrap();
            let current = current % ring.size();
            let deliveries: Vec<_> = specs
                .iter()
                .enumerate()
                .map(|(i, (p, d, s))| {
                    delivery(&i.to_string(), p % ring.size(), d % ring.size(), *s)
                })
                .collect();
            let route = Route::plan(&ring, current, &deliveries);

            prop_assert!(route.total_distance() < 2 * ring.size() as u16);
            for d in &deliveries {
                let dropoff = route.stops().iter().position(|s| s.dropoffs.contains(&d.id));
                prop_assert!(dropoff.is_some());
                if d.state.needs_pickup() {
                    let pickup = route.stops().iter().position(|s| s.pickups.contains(&d.id));
                    prop_assert!(pickup.is_some());
                    prop_assert!(pickup <= dropoff);
                } else {
                    prop_assert!(route.stops().iter().all(|s| !s.pickups.contains(&d.id)));
                }
            }
        }
    }
}
