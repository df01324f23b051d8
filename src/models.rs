//! Data models shared by the sensor producer and the alert worker.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---

/// One simulated measurement, appended to `sensor_readings` per tick.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SensorReading {
    // ---
    pub sensor_name: String,
    pub parameter: String,
    pub value: f64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
}

/// Alert status as reported by the alerting system.
///
/// Anything other than `firing` (Grafana also sends `resolved`) counts as
/// `normal`. A missing status means `firing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum AlertStatus {
    #[default]
    Firing,
    Normal,
}

impl From<String> for AlertStatus {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case("firing") {
            AlertStatus::Firing
        } else {
            AlertStatus::Normal
        }
    }
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Normal => "normal",
        }
    }
}

/// Inbound webhook body. Alerts stay untyped here so one malformed entry
/// cannot reject the whole delivery.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub alerts: Vec<Value>,
}

/// One alert entry as delivered, tolerant of the historical payload shapes.
///
/// Every field is read on its own: a field of the wrong JSON type (e.g.
/// `"labels": null`) is left at its default instead of rejecting the entry.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RawAlert {
    // ---
    #[serde(deserialize_with = "lenient_field")]
    pub labels: HashMap<String, Value>,
    #[serde(deserialize_with = "lenient_field")]
    pub fingerprint: Option<String>,
    #[serde(deserialize_with = "lenient_field")]
    pub status: Option<AlertStatus>,
    #[serde(deserialize_with = "lenient_field")]
    pub values: Option<HashMap<String, Value>>,
    #[serde(rename = "valueString")]
    pub value_string: Option<Value>,
    #[serde(deserialize_with = "lenient_field")]
    pub annotations: HashMap<String, Value>,
}

fn lenient_field<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    // ---
    let raw = Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(raw).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed alert field: {}", e);
        T::default()
    }))
}

/// An alert event after value/threshold extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    // ---
    pub uid: String,
    pub title: String,
    pub status: AlertStatus,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub labels: HashMap<String, Value>,
    pub annotations: HashMap<String, Value>,
}

/// Response body for `POST /grafana/webhook`.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: usize,
    pub actions_taken: Vec<String>,
}

/// A confirmed corrective action about to be persisted to `alert_actions`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActionRecord {
    // ---
    pub alert_uid: String,
    pub alert_title: String,
    pub state: AlertStatus,
    pub threshold: Option<f64>,
    pub current_value: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub sustained_seconds: i64,
    pub action: String,
}

/// The most recent action row matching a title query.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ActionMatch {
    // ---
    pub id: i64,
    pub alert_title: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
}
