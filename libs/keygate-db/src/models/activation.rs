use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row per validation attempt. `id` doubles as the `validation_id`
/// handed back to the client.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivationLog {
    pub id: Uuid,
    pub license_key: String,
    pub license_id: Option<i64>,
    pub device_fingerprint: String,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub reported_ip: Option<String>,
    pub computer_name: Option<String>,
    pub os_version: Option<String>,
    pub product_version: Option<String>,
    pub valid: bool,
    pub status: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActivationLog {
    pub id: Uuid,
    pub license_key: String,
    pub license_id: Option<i64>,
    pub device_fingerprint: String,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub reported_ip: Option<String>,
    pub computer_name: Option<String>,
    pub os_version: Option<String>,
    pub product_version: Option<String>,
    pub valid: bool,
    pub status: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregates over the successful rows of one license, used by the rule
/// checks in place of stored counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivationHistory {
    pub known_devices: Vec<String>,
    pub first_success_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub active_sessions: Vec<String>,
}
