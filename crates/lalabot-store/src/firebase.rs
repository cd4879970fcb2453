//! Firebase Realtime Database REST 后端
//!
//! 每个路径对应 `<base_url>/<path>.json`：
//!
//! | 操作 | 方法 | 路径 |
//! |------|------|------|
//! | 读取请求 | GET | `delivery_requests` |
//! | 写字段 | PUT | `delivery_requests/<id>/<field>` |
//! | 批量写字段 | PATCH | `delivery_requests/<id>` |
//! | 删除 | DELETE | `delivery_requests/<id>` |
//! | 归档 | PUT | `delivery_history/<id>` |
//! | 告警 / 错误 | POST | `security_alerts` / `robot_errors` |
//! | 状态 | PATCH | `robot_status` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, info};

use lalabot_protocol::{DeliveryId, ErrorReport, SecurityAlert, fields};

use crate::{ActiveDeliveries, RemoteStateStore, StoreError, parse_active_deliveries};

/// Firebase 连接配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirebaseConfig {
    /// 数据库地址，如 `https://<project>.firebasedatabase.app`
    pub base_url: String,
    /// 数据库密钥或 ID token，作为 `auth` 查询参数发送
    pub auth: Option<String>,
    /// 单次请求超时（毫秒）
    pub timeout_ms: u64,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth: None,
            timeout_ms: 5_000,
        }
    }
}

pub struct FirebaseStore {
    agent: ureq::Agent,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseStore {
    pub fn new(config: &FirebaseConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        info!("Firebase store: {}", config.base_url);
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth.clone().filter(|auth| !auth.is_empty()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let request = self.agent.request(method, &self.url(path));
        match &self.auth {
            Some(auth) => request.query("auth", auth),
            None => request,
        }
    }

    fn call(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value, StoreError> {
        debug!("{} {}", method, path);
        let request = self.request(method, path);
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        match result {
            Ok(response) => response
                .into_json::<Value>()
                .map_err(|e| StoreError::Decode(e.to_string())),
            Err(ureq::Error::Status(status, _)) => Err(StoreError::Http {
                status,
                path: path.to_string(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(StoreError::Transport(transport.to_string()))
            },
        }
    }

    fn record_path(id: &DeliveryId) -> String {
        format!("{}/{}", fields::DELIVERY_REQUESTS, id)
    }
}

impl RemoteStateStore for FirebaseStore {
    fn get_active_deliveries(&self) -> Result<ActiveDeliveries, StoreError> {
        let collection = self.call("GET", fields::DELIVERY_REQUESTS, None)?;
        Ok(parse_active_deliveries(collection))
    }

    fn update_field(&self, id: &DeliveryId, field: &str, value: Value) -> Result<(), StoreError> {
        let path = format!("{}/{}", Self::record_path(id), field);
        self.call("PUT", &path, Some(&value)).map(drop)
    }

    fn patch_fields(&self, id: &DeliveryId, patch: &Map<String, Value>) -> Result<(), StoreError> {
        let body = Value::Object(patch.clone());
        self.call("PATCH", &Self::record_path(id), Some(&body))
            .map(drop)
    }

    fn delete_record(&self, id: &DeliveryId) -> Result<(), StoreError> {
        self.call("DELETE", &Self::record_path(id), None).map(drop)
    }

    fn append_history(&self, id: &DeliveryId, record: &Value) -> Result<(), StoreError> {
        let path = format!("{}/{}", fields::DELIVERY_HISTORY, id);
        self.call("PUT", &path, Some(record)).map(drop)
    }

    fn report_alert(&self, alert: &SecurityAlert) -> Result<(), StoreError> {
        let body = serde_json::to_value(alert)?;
        self.call("POST", fields::SECURITY_ALERTS, Some(&body))
            .map(drop)
    }

    fn report_error(&self, report: &ErrorReport) -> Result<(), StoreError> {
        let body = serde_json::to_value(report)?;
        self.call("POST", fields::ROBOT_ERRORS, Some(&body)).map(drop)
    }

    fn update_robot_status(&self, patch: &Map<String, Value>) -> Result<(), StoreError> {
        let body = Value::Object(patch.clone());
        self.call("PATCH", fields::ROBOT_STATUS, Some(&body))
            .map(drop)
    }

    fn take_alarm_reset(&self) -> Result<bool, StoreError> {
        let path = format!("{}/{}", fields::ROBOT_STATUS, fields::ALARM_RESET);
        let requested = self.call("GET", &path, None)?.as_bool().unwrap_or(false);
        if requested {
            self.call("PUT", &path, Some(&json!(false)))?;
        }
        Ok(requested)
    }
}
