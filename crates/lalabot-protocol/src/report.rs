//! 上报文档：安全告警、错误、机器人状态

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::delivery::{CompartmentId, DeliveryId};
use crate::room::RoomIndex;
use crate::time::Timestamp;

/// 告警类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// 静止时检测到离开轨道（被抬起）
    TheftAttempt,
    /// 与远端存储失联
    ConnectivityLost,
}

impl AlertKind {
    /// 告警原因文本
    pub fn reason(self) -> &'static str {
        match self {
            Self::TheftAttempt => "robot lifted off the line while stationary",
            Self::ConnectivityLost => "connection to the remote store lost",
        }
    }
}

/// `security_alerts` 列表项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAlert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub reason: String,
    pub timestamp: Timestamp,
    pub severity: String,
    pub location: RoomIndex,
}

impl SecurityAlert {
    pub fn new(kind: AlertKind, location: RoomIndex, timestamp: Timestamp) -> Self {
        Self {
            kind,
            reason: kind.reason().to_string(),
            timestamp,
            severity: "CRITICAL".to_string(),
            location,
        }
    }
}

/// `robot_errors` 列表项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: String,
    pub location: RoomIndex,
    pub timestamp: Timestamp,
}

/// `robot_status` 文档（机器人写入部分）
///
/// `alarmReset` 由操作员写入，不在此结构中，避免覆盖。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotStatus {
    pub current_location: RoomIndex,
    pub is_moving: bool,
    pub alarm_active: bool,
    /// 隔间占用情况（按隔间编号顺序）
    #[serde(with = "occupancy_field")]
    pub current_deliveries: [Option<DeliveryId>; CompartmentId::COUNT],
    pub last_update: Timestamp,
}

impl RobotStatus {
    /// 转换为 PATCH 用的字段表
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

mod occupancy_field {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(
        slots: &[Option<DeliveryId>; CompartmentId::COUNT],
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = Map::new();
        for (index, slot) in slots.iter().enumerate() {
            let id = slot.as_ref().map(DeliveryId::as_str).unwrap_or("");
            map.insert(format!("compartment{}", index + 1), json!(id));
        }
        map.serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<[Option<DeliveryId>; CompartmentId::COUNT], D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        let mut slots: [Option<DeliveryId>; CompartmentId::COUNT] = Default::default();
        for (index, slot) in slots.iter_mut().enumerate() {
            *slot = map
                .get(&format!("compartment{}", index + 1))
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(DeliveryId::new);
        }
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_wire_format() {
        let alert = SecurityAlert::new(AlertKind::TheftAttempt, 3, Timestamp::from_millis(10));
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["type"], json!("THEFT_ATTEMPT"));
        assert_eq!(value["severity"], json!("CRITICAL"));
        assert_eq!(value["location"], json!(3));
        assert_eq!(value["timestamp"], json!(10));

        let lost = SecurityAlert::new(AlertKind::ConnectivityLost, 0, Timestamp::ZERO);
        assert_eq!(serde_json::to_value(&lost).unwrap()["type"], json!("CONNECTIVITY_LOST"));
    }

    #[test]
    fn test_status_occupancy_uses_empty_strings() {
        let status = RobotStatus {
            current_location: 2,
            is_moving: false,
            alarm_active: false,
            current_deliveries: [Some(DeliveryId::new("a")), None, Some(DeliveryId::new("c"))],
            last_update: Timestamp::from_millis(5),
        };
        let fields = status.to_fields();
        assert_eq!(
            fields["currentDeliveries"],
            json!({"compartment1": "a", "compartment2": "", "compartment3": "c"})
        );
        assert_eq!(fields[crate::fields::IS_MOVING], json!(false));

        let back: RobotStatus = serde_json::from_value(Value::Object(fields)).unwrap();
        assert_eq!(back, status);
    }
}
