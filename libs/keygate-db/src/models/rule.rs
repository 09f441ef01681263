use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Restrictions attached to a product. At most one row per product.
///
/// Zero disables the numeric caps; `allow_offline_days = -1` disables the
/// offline window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LicenseRule {
    pub id: i64,
    pub product_id: i64,
    pub max_concurrent_sessions: i32,
    pub max_devices: i32,
    pub max_days: i32,
    pub grace_period_days: i32,
    pub allow_offline_days: i32,
    pub allow_vm: bool,
    pub allowed_countries: Vec<String>,
    pub utc_offset_minutes: i32,
    /// 0 = Sunday .. 6 = Saturday. Empty means every day.
    pub allowed_weekdays: Vec<i16>,
    pub business_start_minute: Option<i32>,
    pub business_end_minute: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicenseRuleInput {
    #[serde(default)]
    pub max_concurrent_sessions: i32,
    #[serde(default)]
    pub max_devices: i32,
    #[serde(default)]
    pub max_days: i32,
    #[serde(default)]
    pub grace_period_days: i32,
    #[serde(default = "disabled_offline_days")]
    pub allow_offline_days: i32,
    #[serde(default = "default_allow_vm")]
    pub allow_vm: bool,
    #[serde(default)]
    pub allowed_countries: Vec<String>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub allowed_weekdays: Vec<i16>,
    #[serde(default)]
    pub business_start_minute: Option<i32>,
    #[serde(default)]
    pub business_end_minute: Option<i32>,
}

fn disabled_offline_days() -> i32 {
    -1
}

fn default_allow_vm() -> bool {
    true
}
