//! 仿真轨道上的端到端场景

mod common;

use std::time::Duration;

use common::{Rig, id};
use lalabot_core::{Clock, DeliveryState, OrchestratorSettings};
use lalabot_hal::{CompartmentState, Direction, LineReading};
use lalabot_protocol::{
    AlertKind, CompartmentId, DeliveryRecord, DeliveryStatus, ProgressStage,
};

fn compartment(n: u8) -> CompartmentId {
    CompartmentId::new(n).unwrap()
}

#[test]
fn test_delivery_from_room_two_to_room_four() {
    let mut rig = Rig::new();
    rig.request("a", 2, 4);

    rig.tick();
    assert_eq!(rig.robot.current_room(), 2);
    assert_eq!(rig.sim.segment_room(), 2);
    assert_eq!(
        rig.robot.delivery_state(&id("a")),
        Some(DeliveryState::FilesConfirmed)
    );
    let record = rig.store.request("a").unwrap();
    assert_eq!(record["progressStage"], 1);
    assert_eq!(record["currentLocation"], 2);

    rig.tick();
    assert_eq!(rig.robot.current_room(), 4);
    assert_eq!(rig.sim.segment_room(), 4);
    assert_eq!(rig.robot.active_count(), 0);
    assert_eq!(rig.robot.allocator().available(), 3);

    assert!(rig.store.request("a").is_none());
    let history = rig.store.history("a").unwrap();
    assert_eq!(history["status"], "completed");
    assert_eq!(history["progressStage"], 3);
    assert_eq!(history["codeVerified"], true);
    assert_eq!(history["readyForPickup"], true);
    assert!(history["completedAt"].is_u64());
    // 移动端写入的字段随记录一起归档
    assert_eq!(history["id"], "a");

    assert_eq!(rig.sim.compartment(compartment(1)), CompartmentState::Closed);
    assert_eq!(rig.sim.last_drive(), Some((Direction::Stop, 0)));
    assert!(!rig.robot.is_moving());

    // 没有活动配送时回到基站
    rig.tick();
    assert_eq!(rig.robot.current_room(), 0);
}

#[test]
fn test_compartment_opens_only_at_stops() {
    let mut rig = Rig::new();
    rig.request("a", 1, 3);
    rig.tick();
    rig.tick();

    let log = rig.sim.servo_log();
    let c = compartment(1);
    assert_eq!(
        log,
        vec![
            (c, CompartmentState::Open),
            (c, CompartmentState::Closed),
            (c, CompartmentState::Open),
            (c, CompartmentState::Closed),
        ]
    );
}

#[test]
fn test_dropoff_behind_pickup_takes_second_pass() {
    let mut rig = Rig::new();
    rig.request("a", 3, 1);

    rig.tick();
    assert_eq!(rig.robot.current_room(), 3);
    rig.tick();
    assert_eq!(rig.robot.current_room(), 1);
    assert_eq!(rig.store.history("a").unwrap()["status"], "completed");
}

#[test]
fn test_fourth_delivery_waits_for_free_compartment() {
    let mut rig = Rig::new();
    for name in ["a", "b", "c", "d"] {
        rig.request(name, 1, 2);
    }

    rig.tick();
    for (name, n) in [("a", 1), ("b", 2), ("c", 3)] {
        assert_eq!(rig.store.request(name).unwrap()["compartment"], n);
    }
    assert_eq!(rig.store.request("d").unwrap()["status"], "pending");
    assert_eq!(rig.robot.allocator().available(), 0);

    rig.tick();
    assert_eq!(rig.robot.current_room(), 2);
    assert_eq!(rig.store.request("d").unwrap()["status"], "pending");
    for name in ["a", "b", "c"] {
        assert_eq!(rig.store.history(name).unwrap()["status"], "completed");
    }

    rig.tick();
    let d = rig.store.request("d").unwrap();
    assert_eq!(d["status"], "in_progress");
    assert_eq!(d["compartment"], 1);
    assert_eq!(rig.robot.current_room(), 1);
}

#[test]
fn test_unconfirmed_pickup_is_cancelled_after_two_timeouts() {
    let mut rig = Rig::new();
    rig.app.ignore("a");
    rig.request("a", 1, 2);
    let start = rig.clock.now();

    rig.tick();
    let waited = rig.clock.now().saturating_duration_since(start);
    assert!(waited > Duration::from_secs(120), "{:?}", waited);
    assert!(waited < Duration::from_secs(125), "{:?}", waited);

    assert!(rig.store.request("a").is_none());
    let history = rig.store.history("a").unwrap();
    assert_eq!(history["status"], "cancelled");
    assert_eq!(history["cancelReason"], "pickup_timeout");
    assert_eq!(rig.robot.allocator().available(), 3);
    assert_eq!(rig.sim.compartment(compartment(1)), CompartmentState::Closed);

    // 释放的隔间可以立即分配给新请求
    rig.request("b", 1, 2);
    rig.tick();
    assert_eq!(rig.store.request("b").unwrap()["compartment"], 1);
}

#[test]
fn test_unverified_dropoff_is_cancelled() {
    let mut rig = Rig::new();
    rig.request("a", 1, 2);
    rig.tick();
    rig.app.ignore("a");
    rig.tick();

    let history = rig.store.history("a").unwrap();
    assert_eq!(history["status"], "cancelled");
    assert_eq!(history["cancelReason"], "dropoff_timeout");
    assert_eq!(rig.robot.current_room(), 2);
}

#[test]
fn test_remote_cancel_during_wait() {
    let mut rig = Rig::new();
    rig.app.cancel_on_arrival("a");
    rig.request("a", 1, 3);

    rig.tick();
    assert_eq!(rig.robot.active_count(), 0);
    assert_eq!(rig.robot.allocator().available(), 3);
    assert_eq!(rig.sim.compartment(compartment(1)), CompartmentState::Closed);
    // 远端已删除，不再写回或归档
    assert!(rig.store.request("a").is_none());
    assert!(rig.store.history("a").is_none());
}

#[test]
fn test_resumes_in_progress_records() {
    let mut rig = Rig::new();

    let mut loaded = DeliveryRecord::new(0, 3, "Eve");
    loaded.status = DeliveryStatus::InProgress;
    loaded.compartment = Some(compartment(2));
    loaded.progress_stage = ProgressStage::InTransit;
    rig.store.insert_request("a", &loaded);

    let mut fresh = DeliveryRecord::new(1, 2, "Finn");
    fresh.status = DeliveryStatus::InProgress;
    fresh.compartment = Some(compartment(1));
    rig.store.insert_request("b", &fresh);

    rig.tick();
    assert_eq!(rig.robot.current_room(), 1);
    assert_eq!(
        rig.robot.allocator().compartment_of(&id("a")),
        Some(compartment(2))
    );
    assert_eq!(
        rig.robot.delivery_state(&id("a")),
        Some(DeliveryState::InTransit)
    );
    assert_eq!(
        rig.robot.delivery_state(&id("b")),
        Some(DeliveryState::FilesConfirmed)
    );

    rig.tick();
    rig.tick();
    assert_eq!(rig.robot.current_room(), 3);
    assert_eq!(rig.store.history("a").unwrap()["status"], "completed");
    assert_eq!(rig.store.history("b").unwrap()["status"], "completed");
}

#[test]
fn test_obstacle_pauses_navigation() {
    let mut rig = Rig::new();
    rig.request("a", 1, 2);
    rig.sim.place_obstacle(12.0, Some(200));

    rig.tick();
    assert_eq!(rig.robot.current_room(), 1);
    assert!(rig.store.errors().is_empty());
    assert_eq!(
        rig.robot.delivery_state(&id("a")),
        Some(DeliveryState::FilesConfirmed)
    );
}

#[test]
fn test_lost_line_is_reported_and_retried() {
    let mut rig = Rig::new();
    rig.request("a", 2, 3);
    rig.sim.override_line(Some(LineReading::new(true, false, true)));

    let start = rig.clock.now();
    rig.robot.run_once();
    assert!(rig.clock.now().saturating_duration_since(start) >= Duration::from_secs(5));

    let errors = rig.store.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["location"], 0);
    assert!(errors[0]["error"].as_str().unwrap().contains("Lost line"));
    assert_eq!(rig.sim.last_drive(), Some((Direction::Stop, 0)));
    assert_eq!(
        rig.robot.delivery_state(&id("a")),
        Some(DeliveryState::Assigned)
    );

    rig.sim.override_line(None);
    rig.robot.run_once();
    assert_eq!(rig.robot.current_room(), 2);
    assert_eq!(rig.store.errors().len(), 1);
}

#[test]
fn test_theft_alarm_until_operator_reset() {
    let mut rig = Rig::new();
    rig.sim.lift(true);

    for _ in 0..6 {
        rig.robot.run_once();
    }
    assert!(!rig.robot.alarm_active());

    rig.robot.run_once();
    assert_eq!(rig.robot.alarm_kind(), Some(AlertKind::TheftAttempt));
    assert!(rig.sim.buzzer_sounding());
    let alerts = rig.store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["type"], "THEFT_ATTEMPT");
    assert_eq!(alerts[0]["severity"], "CRITICAL");
    assert_eq!(rig.store.robot_status()["alarmActive"], true);

    // 放回轨道不会自动解除
    rig.sim.lift(false);
    for _ in 0..5 {
        rig.robot.run_once();
    }
    assert!(rig.robot.alarm_active());
    assert_eq!(rig.store.alerts().len(), 1);

    rig.store.request_alarm_reset();
    rig.robot.run_once();
    assert!(!rig.robot.alarm_active());
    assert!(!rig.sim.buzzer_sounding());
    assert_eq!(rig.store.robot_status()["alarmActive"], false);
    assert_eq!(rig.store.robot_status()["alarmReset"], false);
}

#[test]
fn test_alarm_blocks_deliveries() {
    let mut rig = Rig::new();
    rig.sim.lift(true);
    for _ in 0..7 {
        rig.robot.run_once();
    }
    assert!(rig.robot.alarm_active());

    rig.request("a", 1, 2);
    rig.robot.run_once();
    assert_eq!(rig.robot.active_count(), 0);
    assert_eq!(rig.sim.steps_moved(), 0);
}

#[test]
fn test_connectivity_loss_raises_alarm() {
    let mut rig = Rig::new();
    rig.store.set_offline(true);
    let start = rig.clock.now();

    let mut ticks = 0;
    while !rig.robot.alarm_active() && ticks < 200 {
        rig.robot.run_once();
        ticks += 1;
    }
    assert_eq!(rig.robot.alarm_kind(), Some(AlertKind::ConnectivityLost));
    assert!(rig.clock.now().saturating_duration_since(start) > Duration::from_secs(30));
    assert!(rig.sim.buzzer_sounding());
    assert!(rig.store.alerts().is_empty());

    // 恢复后补报告警
    rig.store.set_offline(false);
    rig.robot.run_once();
    let alerts = rig.store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["type"], "CONNECTIVITY_LOST");
}

#[test]
fn test_custom_timeouts_from_settings() {
    let mut settings = OrchestratorSettings::default();
    settings.policy.confirm_timeout = Duration::from_secs(10);
    settings.policy.max_retries = 1;
    let mut rig = Rig::with_settings(settings);
    rig.app.ignore("a");
    rig.request("a", 0, 1);
    let start = rig.clock.now();

    rig.tick();
    let waited = rig.clock.now().saturating_duration_since(start);
    assert!(waited > Duration::from_secs(10) && waited < Duration::from_secs(12));
    assert_eq!(rig.store.history("a").unwrap()["status"], "cancelled");
    // 取件点就是当前房间，不需要移动
    assert_eq!(rig.sim.steps_moved(), 0);
}
