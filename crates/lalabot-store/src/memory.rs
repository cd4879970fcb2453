//! 内存存储
//!
//! 与 Firebase 相同的 JSON 文档树，克隆后共享同一份数据，
//! 测试可以一边运行机器人一边扮演移动端（写入请求、确认取件、验证取件码）。

use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::trace;

use lalabot_protocol::{DeliveryId, DeliveryRecord, ErrorReport, SecurityAlert, fields};

use crate::{ActiveDeliveries, RemoteStateStore, StoreError, parse_active_deliveries};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    /// 顶层集合名 → 文档
    root: Mutex<HashMap<String, Map<String, Value>>>,
    offline: AtomicBool,
    next_key: AtomicU64,
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟断网：之后的调用全部返回 [`StoreError::Unavailable`]
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// 机器人发起的调用次数（含失败）
    pub fn call_count(&self) -> u64 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// 以移动端身份创建配送请求
    pub fn insert_request(&self, id: &str, record: &DeliveryRecord) {
        let mut value = record.to_value();
        value["id"] = json!(id);
        self.with_collection(fields::DELIVERY_REQUESTS, |requests| {
            requests.insert(id.to_string(), value);
        });
    }

    /// 以移动端身份写入字段（如 `filesConfirmed`、`codeVerified`）
    pub fn set_request_field(&self, id: &str, field: &str, value: Value) {
        self.with_collection(fields::DELIVERY_REQUESTS, |requests| {
            if let Some(Value::Object(record)) = requests.get_mut(id) {
                record.insert(field.to_string(), value);
            }
        });
    }

    /// 以移动端身份删除请求
    pub fn remove_request(&self, id: &str) {
        self.with_collection(fields::DELIVERY_REQUESTS, |requests| {
            requests.remove(id);
        });
    }

    pub fn request(&self, id: &str) -> Option<Value> {
        self.get(fields::DELIVERY_REQUESTS, id)
    }

    pub fn history(&self, id: &str) -> Option<Value> {
        self.get(fields::DELIVERY_HISTORY, id)
    }

    pub fn alerts(&self) -> Vec<Value> {
        self.list(fields::SECURITY_ALERTS)
    }

    pub fn errors(&self) -> Vec<Value> {
        self.list(fields::ROBOT_ERRORS)
    }

    pub fn robot_status(&self) -> Value {
        self.inner
            .root
            .lock()
            .get(fields::ROBOT_STATUS)
            .cloned()
            .map_or(Value::Null, Value::Object)
    }

    /// 以操作员身份请求复位告警
    pub fn request_alarm_reset(&self) {
        self.with_collection(fields::ROBOT_STATUS, |status| {
            status.insert(fields::ALARM_RESET.to_string(), json!(true));
        });
    }

    fn get(&self, collection: &str, key: &str) -> Option<Value> {
        self.inner
            .root
            .lock()
            .get(collection)
            .and_then(|c| c.get(key))
            .cloned()
    }

    fn list(&self, collection: &str) -> Vec<Value> {
        self.inner
            .root
            .lock()
            .get(collection)
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    fn with_collection<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Map<String, Value>) -> R,
    ) -> R {
        let mut root = self.inner.root.lock();
        f(root.entry(collection.to_string()).or_default())
    }

    /// 机器人侧调用入口：计数并检查离线状态
    fn begin(&self, op: &str) -> Result<(), StoreError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        trace!("memory store: {}", op);
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn push(&self, collection: &str, value: Value) {
        let key = format!("-M{:08}", self.inner.next_key.fetch_add(1, Ordering::SeqCst));
        self.with_collection(collection, |list| {
            list.insert(key, value);
        });
    }
}

impl RemoteStateStore for MemoryStore {
    fn get_active_deliveries(&self) -> Result<ActiveDeliveries, StoreError> {
        self.begin("get_active_deliveries")?;
        let collection = self
            .inner
            .root
            .lock()
            .get(fields::DELIVERY_REQUESTS)
            .cloned()
            .map_or(Value::Null, Value::Object);
        Ok(parse_active_deliveries(collection))
    }

    fn update_field(&self, id: &DeliveryId, field: &str, value: Value) -> Result<(), StoreError> {
        let mut patch = Map::new();
        patch.insert(field.to_string(), value);
        self.patch_fields(id, &patch)
    }

    fn patch_fields(&self, id: &DeliveryId, patch: &Map<String, Value>) -> Result<(), StoreError> {
        self.begin("patch_fields")?;
        self.with_collection(fields::DELIVERY_REQUESTS, |requests| {
            // 与 REST PATCH 一致：不存在时创建
            let record = requests
                .entry(id.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(record) = record {
                for (key, value) in patch {
                    record.insert(key.clone(), value.clone());
                }
            }
        });
        Ok(())
    }

    fn delete_record(&self, id: &DeliveryId) -> Result<(), StoreError> {
        self.begin("delete_record")?;
        self.with_collection(fields::DELIVERY_REQUESTS, |requests| {
            requests.remove(id.as_str());
        });
        Ok(())
    }

    fn append_history(&self, id: &DeliveryId, record: &Value) -> Result<(), StoreError> {
        self.begin("append_history")?;
        self.with_collection(fields::DELIVERY_HISTORY, |history| {
            history.insert(id.to_string(), record.clone());
        });
        Ok(())
    }

    fn report_alert(&self, alert: &SecurityAlert) -> Result<(), StoreError> {
        self.begin("report_alert")?;
        self.push(fields::SECURITY_ALERTS, serde_json::to_value(alert)?);
        Ok(())
    }

    fn report_error(&self, report: &ErrorReport) -> Result<(), StoreError> {
        self.begin("report_error")?;
        self.push(fields::ROBOT_ERRORS, serde_json::to_value(report)?);
        Ok(())
    }

    fn update_robot_status(&self, patch: &Map<String, Value>) -> Result<(), StoreError> {
        self.begin("update_robot_status")?;
        self.with_collection(fields::ROBOT_STATUS, |status| {
            for (key, value) in patch {
                status.insert(key.clone(), value.clone());
            }
        });
        Ok(())
    }

    fn take_alarm_reset(&self) -> Result<bool, StoreError> {
        self.begin("take_alarm_reset")?;
        Ok(self.with_collection(fields::ROBOT_STATUS, |status| {
            let requested = status
                .get(fields::ALARM_RESET)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if requested {
                status.insert(fields::ALARM_RESET.to_string(), json!(false));
            }
            requested
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lalabot_protocol::{AlertKind, DeliveryStatus, Timestamp};

    #[test]
    fn test_requests_flow_through_active_listing() {
        let store = MemoryStore::new();
        store.insert_request("a", &DeliveryRecord::new(1, 2, "Ben"));
        let active = store.get_active_deliveries().unwrap();
        assert_eq!(active.len(), 1);

        let id = DeliveryId::new("a");
        store
            .update_field(&id, fields::STATUS, json!("completed"))
            .unwrap();
        assert!(store.get_active_deliveries().unwrap().is_empty());
        assert_eq!(store.request("a").unwrap()["status"], json!("completed"));
        // 移动端写入的 id 字段保留
        assert_eq!(store.request("a").unwrap()["id"], json!("a"));
    }

    #[test]
    fn test_archive_moves_record() {
        let store = MemoryStore::new();
        store.insert_request("a", &DeliveryRecord::new(1, 2, "Ben"));
        let id = DeliveryId::new("a");
        let record = store.request("a").unwrap();
        store.append_history(&id, &record).unwrap();
        store.delete_record(&id).unwrap();
        assert!(store.request("a").is_none());
        assert_eq!(store.history("a").unwrap()["pickup"], json!(1));
    }

    #[test]
    fn test_offline_rejects_calls() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert_eq!(store.get_active_deliveries(), Err(StoreError::Unavailable));
        store.set_offline(false);
        assert!(store.get_active_deliveries().is_ok());
        assert_eq!(store.call_count(), 2);
    }

    #[test]
    fn test_alarm_reset_is_consumed_once() {
        let store = MemoryStore::new();
        assert!(!store.take_alarm_reset().unwrap());
        store.request_alarm_reset();
        assert!(store.take_alarm_reset().unwrap());
        assert!(!store.take_alarm_reset().unwrap());
    }

    #[test]
    fn test_reports_are_appended() {
        let store = MemoryStore::new();
        let alert = SecurityAlert::new(AlertKind::TheftAttempt, 2, Timestamp::from_millis(1));
        store.report_alert(&alert).unwrap();
        store.report_alert(&alert).unwrap();
        store
            .report_error(&ErrorReport {
                error: "lost line".into(),
                location: 3,
                timestamp: Timestamp::from_millis(2),
            })
            .unwrap();
        assert_eq!(store.alerts().len(), 2);
        assert_eq!(store.errors()[0]["location"], json!(3));
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStore::new();
        let app = store.clone();
        app.insert_request("x", &DeliveryRecord::new(2, 3, "Ana"));
        app.set_request_field("x", fields::STATUS, json!("in_progress"));
        let active = store.get_active_deliveries().unwrap();
        assert_eq!(active[&DeliveryId::new("x")].status, DeliveryStatus::InProgress);
    }
}
