use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecurityEvent {
    pub id: i64,
    pub event_type: String,
    pub severity: String,
    pub customer_id: Option<i64>,
    pub license_id: Option<i64>,
    pub ip_address: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSecurityEvent {
    pub event_type: String,
    /// One of `low`, `medium`, `high`, `critical`.
    pub severity: String,
    pub customer_id: Option<i64>,
    pub license_id: Option<i64>,
    pub ip_address: Option<String>,
    pub details: serde_json::Value,
}
