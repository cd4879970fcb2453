//! # 配送编排
//!
//! 单线程协作式主循环。每个 tick：
//!
//! 1. 静止状态下采样防盗/失联监测，告警期间只处理复位
//! 2. 轮询远端活动配送，分配隔间、恢复进行中的配送、处理远端取消
//! 3. 从当前房间规划路线，前往第一个停靠点
//! 4. 在停靠点先处理全部取件，再处理全部送件
//! 5. 没有活动配送时返回基站
//!
//! 每个停靠点服务完成后下一 tick 重新规划，新请求可以在途中加入。
//! 远端写入均为尽力而为：失败只记录警告，不在原地重试。

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use lalabot_hal::{BuzzerPattern, CompartmentState, HalError, RobotHardware};
use lalabot_protocol::{
    AlertKind, CompartmentId, DeliveryId, DeliveryRecord, DeliveryStatus, ErrorReport,
    ProgressStage, RobotStatus, RoomIndex, RoomRing, SecurityAlert, Timestamp, fields,
};
use lalabot_store::{ActiveDeliveries, RemoteStateStore, StoreError};

use crate::allocator::CompartmentAllocator;
use crate::clock::Clock;
use crate::delivery::{Delivery, DeliveryEvent, DeliveryPolicy, DeliveryState, Effect};
use crate::error::{NavigationError, RobotError};
use crate::heartbeat::ConnectionMonitor;
use crate::navigation::{NavigationController, NavigationSettings};
use crate::route::Route;
use crate::safety::{SafetyMonitor, SafetySettings};
use crate::shutdown::ShutdownFlag;

/// 编排器参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub navigation: NavigationSettings,
    pub policy: DeliveryPolicy,
    pub safety: SafetySettings,
    pub buzzer: BuzzerPattern,
    /// 主循环与等待循环的 tick
    pub tick: Duration,
    pub error_backoff: Duration,
    /// 超过该时长没有成功的存储调用视为失联
    pub connectivity_bound: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            navigation: NavigationSettings::default(),
            policy: DeliveryPolicy::default(),
            safety: SafetySettings::default(),
            buzzer: BuzzerPattern::default(),
            tick: Duration::from_millis(500),
            error_backoff: Duration::from_secs(5),
            connectivity_bound: Duration::from_secs(30),
        }
    }
}

/// 机器人侧状态与最近一次看到的远端记录
#[derive(Debug, Clone)]
struct ActiveDelivery {
    delivery: Delivery,
    record: DeliveryRecord,
}

type ActiveMap = BTreeMap<DeliveryId, ActiveDelivery>;

/// 成功时登记连通性，失败时记录警告
fn best_effort<T>(
    connection: &ConnectionMonitor,
    now: Timestamp,
    what: &str,
    result: Result<T, StoreError>,
) -> Option<T> {
    match result {
        Ok(value) => {
            connection.register_success(now);
            Some(value)
        },
        Err(e) if e.is_transient() => {
            warn!("Store call '{}' failed: {}", what, e);
            None
        },
        // 远端有应答，连接本身正常
        Err(e) => {
            connection.register_success(now);
            error!("Store call '{}' rejected: {}", what, e);
            None
        },
    }
}

pub struct Orchestrator<S: RemoteStateStore, C: Clock> {
    settings: OrchestratorSettings,
    store: S,
    clock: C,
    hardware: RobotHardware,
    navigation: NavigationController,
    allocator: CompartmentAllocator,
    safety: SafetyMonitor,
    connection: ConnectionMonitor,
    active: ActiveMap,
    /// 本轮已完成或已取消的配送
    finished: HashSet<DeliveryId>,
    /// 房间不在环上的请求
    rejected: HashSet<DeliveryId>,
    /// 尚未成功上报的告警
    unreported_alert: Option<SecurityAlert>,
    shutdown: ShutdownFlag,
}

impl<S: RemoteStateStore, C: Clock> Orchestrator<S, C> {
    pub fn new(
        settings: OrchestratorSettings,
        hardware: RobotHardware,
        store: S,
        clock: C,
        shutdown: ShutdownFlag,
    ) -> Self {
        let connection = ConnectionMonitor::new(clock.now(), settings.connectivity_bound);
        Self {
            navigation: NavigationController::new(settings.navigation.clone()),
            safety: SafetyMonitor::new(settings.safety),
            allocator: CompartmentAllocator::new(),
            connection,
            active: ActiveMap::new(),
            finished: HashSet::new(),
            rejected: HashSet::new(),
            unreported_alert: None,
            settings,
            store,
            clock,
            hardware,
            shutdown,
        }
    }

    pub fn current_room(&self) -> RoomIndex {
        self.navigation.current_room()
    }

    pub fn is_moving(&self) -> bool {
        self.navigation.pose().is_moving
    }

    pub fn alarm_active(&self) -> bool {
        self.safety.alarm_active()
    }

    pub fn alarm_kind(&self) -> Option<AlertKind> {
        self.safety.alarm_kind()
    }

    /// 活动配送的机器人侧状态
    pub fn delivery_state(&self, id: &DeliveryId) -> Option<DeliveryState> {
        self.active.get(id).map(|entry| entry.delivery.state)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn allocator(&self) -> &CompartmentAllocator {
        &self.allocator
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    fn ring(&self) -> RoomRing {
        self.settings.navigation.ring
    }

    /// 运行直到收到停机请求，然后进入安全状态
    pub fn run(&mut self) {
        info!(
            "Orchestrator running: {} rooms, tick {:?}",
            self.ring().room_count(),
            self.settings.tick
        );
        self.update_status();
        while !self.shutdown.is_requested() {
            self.run_once();
        }
        self.shutdown_sequence();
    }

    /// 主循环的一次迭代（含错误处理与 tick 间隔）
    pub fn run_once(&mut self) {
        match self.tick() {
            Ok(()) => {},
            Err(e) if e.is_shutdown() => debug!("Tick interrupted by shutdown"),
            Err(e) => self.handle_error(e),
        }
        self.update_status();
        if !self.shutdown.is_requested() {
            self.clock.sleep(self.settings.tick);
        }
    }

    /// 主循环的一个 tick
    pub fn tick(&mut self) -> Result<(), RobotError> {
        if self.shutdown.is_requested() {
            return Err(NavigationError::Cancelled.into());
        }
        if self.sample_safety() {
            self.handle_alarm();
            return Ok(());
        }

        let now = self.clock.now();
        let Some(remote) = best_effort(
            &self.connection,
            now,
            "get_active_deliveries",
            self.store.get_active_deliveries(),
        ) else {
            return Ok(());
        };
        self.sync(remote)?;

        if self.active.is_empty() {
            if !self.finished.is_empty() {
                debug!("No active deliveries, clearing {} finished", self.finished.len());
                self.finished.clear();
            }
            if self.current_room() != RoomRing::BASE {
                info!("All deliveries done, returning to base");
                self.travel_to(RoomRing::BASE)?;
            }
            return Ok(());
        }

        let route = Route::plan(
            &self.ring(),
            self.current_room(),
            self.active.values().map(|entry| &entry.delivery),
        );
        let Some(stop) = route.first() else {
            return Ok(());
        };
        debug!(
            "Route: {:?} ({} markers)",
            route.stops().iter().map(|s| s.room).collect::<Vec<_>>(),
            route.total_distance()
        );

        if stop.offset > 0 {
            self.travel_to(stop.room)?;
        }
        self.serve_stop(stop.room)
    }

    /// 与远端活动配送同步
    fn sync(&mut self, remote: ActiveDeliveries) -> Result<(), RobotError> {
        let vanished: Vec<DeliveryId> = self
            .active
            .keys()
            .filter(|id| !remote.contains_key(*id))
            .cloned()
            .collect();
        for id in vanished {
            info!("Delivery {} is no longer active remotely", id);
            self.apply(&id, DeliveryEvent::Cancel)?;
        }
        // 远端已删除的无效请求不再跟踪
        self.rejected.retain(|id| remote.contains_key(id));

        let ring = self.ring();
        for (id, record) in remote {
            if let Some(entry) = self.active.get_mut(&id) {
                entry.record = record;
                continue;
            }
            if self.finished.contains(&id) || self.rejected.contains(&id) {
                continue;
            }
            if !ring.contains(record.pickup) || !ring.contains(record.destination) {
                warn!(
                    "Delivery {} has rooms outside the ring ({} -> {}), ignoring",
                    id, record.pickup, record.destination
                );
                self.rejected.insert(id);
                continue;
            }

            match (record.status, record.compartment) {
                (DeliveryStatus::InProgress, Some(compartment)) => {
                    if self.allocator.claim(&id, compartment) {
                        let delivery = Delivery::resume(id.clone(), &record, compartment);
                        info!(
                            "Resuming delivery {} in compartment {} ({:?})",
                            id, compartment, delivery.state
                        );
                        self.active.insert(id, ActiveDelivery { delivery, record });
                    } else {
                        warn!(
                            "Delivery {} claims compartment {} which is taken",
                            id, compartment
                        );
                    }
                },
                _ => self.assign(id, record),
            }
        }
        Ok(())
    }

    /// 为新请求分配隔间并写回远端
    fn assign(&mut self, id: DeliveryId, record: DeliveryRecord) {
        let Some(compartment) = self.allocator.assign(&id) else {
            debug!("No free compartment for {}, leaving it pending", id);
            return;
        };

        let mut patch = Map::new();
        patch.insert(
            fields::STATUS.to_string(),
            Value::from(DeliveryStatus::InProgress.as_str()),
        );
        patch.insert(
            fields::COMPARTMENT.to_string(),
            Value::from(compartment.get()),
        );
        patch.insert(
            fields::PROGRESS_STAGE.to_string(),
            Value::from(u8::from(ProgressStage::Processing)),
        );

        let now = self.clock.now();
        if best_effort(
            &self.connection,
            now,
            "assign",
            self.store.patch_fields(&id, &patch),
        )
        .is_none()
        {
            self.allocator.release(compartment);
            return;
        }

        let record = record.merged_with(&patch).unwrap_or(record);
        info!(
            "Delivery {} assigned to compartment {}: room {} -> room {}",
            id, compartment, record.pickup, record.destination
        );
        let delivery = Delivery::assigned(id.clone(), &record, compartment);
        self.active.insert(id, ActiveDelivery { delivery, record });
    }

    /// 向配送发送事件并执行副作用
    fn apply(&mut self, id: &DeliveryId, event: DeliveryEvent) -> Result<(), RobotError> {
        let now = self.clock.now();
        let Some(entry) = self.active.get_mut(id) else {
            return Ok(());
        };
        let transition = entry.delivery.step(event, now, &self.settings.policy);
        entry.delivery = transition.delivery;

        // 舵机失败不能打断记账，先记下第一个错误
        let mut fault = None;
        for effect in transition.effects {
            match effect {
                Effect::OpenCompartment(c) => {
                    actuate(&mut self.hardware, c, CompartmentState::Open, &mut fault)
                },
                Effect::CloseCompartment(c) => {
                    actuate(&mut self.hardware, c, CompartmentState::Closed, &mut fault)
                },
                Effect::ReleaseCompartment(c) => self.allocator.release(c),
                Effect::PatchRecord(patch) => {
                    match entry.record.merged_with(&patch) {
                        Ok(record) => entry.record = record,
                        Err(e) => warn!("Local copy of {} not updated: {}", id, e),
                    }
                    best_effort(
                        &self.connection,
                        now,
                        "patch_fields",
                        self.store.patch_fields(id, &patch),
                    );
                },
                Effect::Archive { status, reason } => {
                    info!(
                        "Archiving delivery {} as {}{}",
                        id,
                        status.as_str(),
                        reason.map(|r| format!(" ({})", r.as_str())).unwrap_or_default()
                    );
                    let history = entry.record.to_value();
                    let archived = best_effort(
                        &self.connection,
                        now,
                        "append_history",
                        self.store.append_history(id, &history),
                    );
                    // 历史写入失败时保留原记录
                    if archived.is_some() {
                        best_effort(
                            &self.connection,
                            now,
                            "delete_record",
                            self.store.delete_record(id),
                        );
                    }
                },
            }
        }

        if entry.delivery.state.is_terminal() {
            debug!("Delivery {} finished: {:?}", id, entry.delivery.state);
            self.active.remove(id);
            self.finished.insert(id.clone());
        }
        match fault {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// 前往目标房间
    fn travel_to(&mut self, target: RoomIndex) -> Result<(), RobotError> {
        let departing: Vec<DeliveryId> = self
            .active
            .iter()
            .filter(|(_, entry)| entry.delivery.state == DeliveryState::FilesConfirmed)
            .map(|(id, _)| id.clone())
            .collect();
        for id in departing {
            self.apply(&id, DeliveryEvent::Departed)?;
        }

        let ring = self.ring();
        let policy = self.settings.policy;
        let store = &self.store;
        let connection = &self.connection;
        let clock = &self.clock;
        let active = &mut self.active;

        on_crossing(store, connection, clock, active, &ring, &policy, self.navigation.current_room());
        self.navigation.navigate_to(
            &mut self.hardware,
            target,
            &self.clock,
            &self.shutdown,
            |room| on_crossing(store, connection, clock, active, &ring, &policy, room),
        )?;
        Ok(())
    }

    /// 在当前房间先取件后送件
    fn serve_stop(&mut self, room: RoomIndex) -> Result<(), RobotError> {
        let pickups = self.select(|d| d.state.needs_pickup() && d.pickup == room);
        if !pickups.is_empty() {
            for id in &pickups {
                self.apply(id, DeliveryEvent::ArrivedAtPickup)?;
            }
            if !self.wait_for(&pickups, DeliveryState::AtPickup)? {
                return Ok(());
            }
        }

        let dropoffs = self.select(|d| d.state.is_on_board() && d.destination == room);
        if !dropoffs.is_empty() {
            for id in &dropoffs {
                self.apply(id, DeliveryEvent::ArrivedAtDestination)?;
            }
            self.wait_for(&dropoffs, DeliveryState::AtDestination)?;
        }
        Ok(())
    }

    fn select(&self, predicate: impl Fn(&Delivery) -> bool) -> Vec<DeliveryId> {
        self.active
            .iter()
            .filter(|(_, entry)| predicate(&entry.delivery))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// 等待一组配送离开 `waiting` 状态
    ///
    /// 告警打断等待时返回 `false`。
    fn wait_for(&mut self, ids: &[DeliveryId], waiting: DeliveryState) -> Result<bool, RobotError> {
        loop {
            let pending: Vec<DeliveryId> = ids
                .iter()
                .filter(|id| self.delivery_state(id) == Some(waiting))
                .cloned()
                .collect();
            if pending.is_empty() {
                return Ok(true);
            }
            if self.shutdown.is_requested() {
                return Err(NavigationError::Cancelled.into());
            }

            self.clock.sleep(self.settings.tick);
            if self.sample_safety() {
                info!("Alarm interrupted the wait at room {}", self.current_room());
                return Ok(false);
            }

            let now = self.clock.now();
            let Some(remote) = best_effort(
                &self.connection,
                now,
                "get_active_deliveries",
                self.store.get_active_deliveries(),
            ) else {
                continue;
            };

            for id in pending {
                let event = match remote.get(&id) {
                    Some(record) => {
                        let event = DeliveryEvent::Poll {
                            confirmed: record.files_confirmed,
                            verified: record.code_verified,
                        };
                        if let Some(entry) = self.active.get_mut(&id) {
                            entry.record = record.clone();
                        }
                        event
                    },
                    None => DeliveryEvent::Cancel,
                };
                self.apply(&id, event)?;
            }
        }
    }

    /// 静止时采样安全监测，返回告警是否处于激活状态
    fn sample_safety(&mut self) -> bool {
        let now = self.clock.now();
        let moving = self.navigation.pose().is_moving;
        let mut fired = match self.navigation.read_sensors(&mut self.hardware) {
            Ok(reading) => self
                .safety
                .check_off_line(reading, moving, self.settings.tick),
            Err(e) => {
                debug!("Line sensors unavailable for safety check: {}", e);
                None
            },
        };
        if fired.is_none() {
            fired = self.safety.check_connectivity(&self.connection, now);
        }
        if let Some(kind) = fired {
            self.raise_alarm(kind);
        }
        self.safety.alarm_active()
    }

    fn raise_alarm(&mut self, kind: AlertKind) {
        let room = self.current_room();
        error!("Security alarm at room {}: {}", room, kind.reason());

        if let Err(e) = self.navigation.stop(&mut self.hardware) {
            warn!("Failed to stop motors: {}", e);
        }
        if let Err(e) = self.hardware.servos.close_all() {
            warn!("Failed to close compartments: {}", e);
        }
        if let Err(e) = self.hardware.buzzer.alarm(self.settings.buzzer) {
            warn!("Failed to sound buzzer: {}", e);
        }

        self.unreported_alert = Some(SecurityAlert::new(kind, room, self.clock.now()));
        self.flush_alert();
    }

    fn flush_alert(&mut self) {
        let Some(alert) = &self.unreported_alert else {
            return;
        };
        let now = self.clock.now();
        if best_effort(
            &self.connection,
            now,
            "report_alert",
            self.store.report_alert(alert),
        )
        .is_some()
        {
            self.unreported_alert = None;
        }
    }

    /// 告警期间：补报告警并检查操作员复位
    fn handle_alarm(&mut self) {
        self.flush_alert();
        let now = self.clock.now();
        let reset = best_effort(
            &self.connection,
            now,
            "take_alarm_reset",
            self.store.take_alarm_reset(),
        );
        if reset == Some(true) {
            info!("Alarm reset by operator");
            self.safety.disable_alarm();
            if let Err(e) = self.hardware.buzzer.silence() {
                warn!("Failed to silence buzzer: {}", e);
            }
        }
    }

    fn handle_error(&mut self, e: RobotError) {
        let room = self.current_room();
        error!("Control loop error at room {}: {}", room, e);
        if let Err(stop) = self.navigation.stop(&mut self.hardware) {
            warn!("Failed to stop motors: {}", stop);
        }

        let now = self.clock.now();
        let report = ErrorReport {
            error: e.to_string(),
            location: room,
            timestamp: now,
        };
        best_effort(
            &self.connection,
            now,
            "report_error",
            self.store.report_error(&report),
        );

        let mut remaining = self.settings.error_backoff;
        while !remaining.is_zero() && !self.shutdown.is_requested() {
            let slice = remaining.min(self.settings.tick);
            self.clock.sleep(slice);
            remaining -= slice;
        }
    }

    fn update_status(&self) {
        let now = self.clock.now();
        let pose = self.navigation.pose();
        let status = RobotStatus {
            current_location: pose.current_room,
            is_moving: pose.is_moving,
            alarm_active: self.alarm_active(),
            current_deliveries: self.allocator.occupancy(),
            last_update: now,
        };
        best_effort(
            &self.connection,
            now,
            "update_robot_status",
            self.store.update_robot_status(&status.to_fields()),
        );
    }

    /// 停机：停车、关闭隔间、静音并上报最终状态
    pub fn shutdown_sequence(&mut self) {
        info!("Shutting down at room {}", self.current_room());
        if let Err(e) = self.navigation.stop(&mut self.hardware) {
            warn!("Failed to stop motors: {}", e);
        }
        if let Err(e) = self.hardware.servos.close_all() {
            warn!("Failed to close compartments: {}", e);
        }
        if let Err(e) = self.hardware.buzzer.silence() {
            warn!("Failed to silence buzzer: {}", e);
        }
        self.update_status();
    }
}

/// 驱动舵机，失败只记录第一个错误
fn actuate(
    hardware: &mut RobotHardware,
    compartment: CompartmentId,
    state: CompartmentState,
    fault: &mut Option<HalError>,
) {
    if let Err(e) = hardware.servos.set_compartment(compartment, state) {
        warn!("Compartment {} failed to reach {:?}: {}", compartment, state, e);
        fault.get_or_insert(e);
    }
}

/// 确认经过一个房间：写入位置，并向即将到达目的地的配送发送 `Approaching`
fn on_crossing<S: RemoteStateStore, C: Clock>(
    store: &S,
    connection: &ConnectionMonitor,
    clock: &C,
    active: &mut ActiveMap,
    ring: &RoomRing,
    policy: &DeliveryPolicy,
    room: RoomIndex,
) {
    let now = clock.now();
    for (id, entry) in active.iter_mut() {
        let mut patch = Map::new();
        patch.insert(fields::CURRENT_LOCATION.to_string(), Value::from(room));

        if entry.delivery.state == DeliveryState::InTransit
            && ring.next(room) == entry.delivery.destination
        {
            let transition = entry.delivery.step(DeliveryEvent::Approaching, now, policy);
            entry.delivery = transition.delivery;
            for effect in transition.effects {
                if let Effect::PatchRecord(fields) = effect {
                    patch.extend(fields);
                }
            }
        }

        if let Ok(record) = entry.record.merged_with(&patch) {
            entry.record = record;
        }
        best_effort(connection, now, "patch_fields", store.patch_fields(id, &patch));
    }

    let mut status = Map::new();
    status.insert(fields::CURRENT_LOCATION.to_string(), Value::from(room));
    status.insert(fields::IS_MOVING.to_string(), Value::Bool(true));
    best_effort(
        connection,
        now,
        "update_robot_status",
        store.update_robot_status(&status),
    );
}
