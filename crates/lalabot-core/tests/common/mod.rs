//! 场景测试公共设施
//!
//! [`MobileApp`] 包装 [`MemoryStore`]，在机器人每次轮询前扮演移动端：
//! 机器人在取件点等待时确认放件，在目的地等待时验证取件码。

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use lalabot_core::{ManualClock, Orchestrator, OrchestratorSettings, ShutdownFlag};
use lalabot_hal::{SimConfig, SimHandle, sim};
use lalabot_protocol::{
    DeliveryId, DeliveryRecord, DeliveryStatus, ErrorReport, ProgressStage, RoomRing,
    SecurityAlert, fields,
};
use lalabot_store::{ActiveDeliveries, MemoryStore, RemoteStateStore, StoreError};

#[derive(Default)]
struct Script {
    /// 不做任何响应的请求
    ignored: HashSet<String>,
    /// 机器人到达取件点后由移动端删除的请求
    cancel_on_arrival: HashSet<String>,
}

#[derive(Clone)]
pub struct MobileApp {
    pub store: MemoryStore,
    script: Arc<Mutex<Script>>,
}

impl MobileApp {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    pub fn ignore(&self, id: &str) {
        self.script.lock().ignored.insert(id.to_string());
    }

    pub fn cancel_on_arrival(&self, id: &str) {
        self.script.lock().cancel_on_arrival.insert(id.to_string());
    }

    fn respond(&self) {
        let Ok(active) = self.store.get_active_deliveries() else {
            return;
        };
        let script = self.script.lock();
        for (id, record) in active {
            let id = id.as_str();
            if script.ignored.contains(id) || record.status != DeliveryStatus::InProgress {
                continue;
            }
            let waiting_at_pickup = record.progress_stage == ProgressStage::Processing
                && record.confirmation_deadline.is_some()
                && !record.files_confirmed;
            if waiting_at_pickup && script.cancel_on_arrival.contains(id) {
                self.store.remove_request(id);
            } else if waiting_at_pickup {
                self.store
                    .set_request_field(id, fields::FILES_CONFIRMED, Value::Bool(true));
            } else if record.ready_for_pickup && !record.code_verified {
                self.store
                    .set_request_field(id, fields::CODE_VERIFIED, Value::Bool(true));
            }
        }
    }
}

impl RemoteStateStore for MobileApp {
    fn get_active_deliveries(&self) -> Result<ActiveDeliveries, StoreError> {
        self.respond();
        self.store.get_active_deliveries()
    }

    fn update_field(&self, id: &DeliveryId, field: &str, value: Value) -> Result<(), StoreError> {
        self.store.update_field(id, field, value)
    }

    fn patch_fields(&self, id: &DeliveryId, fields: &Map<String, Value>) -> Result<(), StoreError> {
        self.store.patch_fields(id, fields)
    }

    fn delete_record(&self, id: &DeliveryId) -> Result<(), StoreError> {
        self.store.delete_record(id)
    }

    fn append_history(&self, id: &DeliveryId, record: &Value) -> Result<(), StoreError> {
        self.store.append_history(id, record)
    }

    fn report_alert(&self, alert: &SecurityAlert) -> Result<(), StoreError> {
        self.store.report_alert(alert)
    }

    fn report_error(&self, report: &ErrorReport) -> Result<(), StoreError> {
        self.store.report_error(report)
    }

    fn update_robot_status(&self, fields: &Map<String, Value>) -> Result<(), StoreError> {
        self.store.update_robot_status(fields)
    }

    fn take_alarm_reset(&self) -> Result<bool, StoreError> {
        self.store.take_alarm_reset()
    }
}

pub struct Rig {
    pub robot: Orchestrator<MobileApp, ManualClock>,
    pub app: MobileApp,
    pub store: MemoryStore,
    pub sim: SimHandle,
    pub clock: ManualClock,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_settings(OrchestratorSettings::default())
    }

    pub fn with_settings(settings: OrchestratorSettings) -> Self {
        let (hardware, sim) =
            sim::build(settings.navigation.ring, &SimConfig::default()).expect("sim hardware");
        let store = MemoryStore::new();
        let app = MobileApp::new(store.clone());
        let clock = ManualClock::default();
        let robot = Orchestrator::new(
            settings,
            hardware,
            app.clone(),
            clock.clone(),
            ShutdownFlag::new(),
        );
        Self {
            robot,
            app,
            store,
            sim,
            clock,
        }
    }

    /// 以移动端身份创建请求
    pub fn request(&self, id: &str, pickup: u8, destination: u8) {
        self.store
            .insert_request(id, &DeliveryRecord::new(pickup, destination, "Dana"));
    }

    pub fn tick(&mut self) {
        self.robot.tick().expect("tick");
    }
}

pub fn id(s: &str) -> DeliveryId {
    DeliveryId::new(s)
}

pub fn ring() -> RoomRing {
    RoomRing::default()
}
