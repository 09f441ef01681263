use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const LICENSE_STATUSES: [&str; 4] = ["active", "suspended", "expired", "revoked"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct License {
    pub id: i64,
    pub license_key: String,
    pub customer_id: i64,
    pub product_id: i64,
    /// `None` for floating licenses that are not bound to one machine.
    pub device_fingerprint: Option<String>,
    pub hardware_hash: Option<String>,
    pub mac_addresses: Vec<String>,
    pub status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub validation_count: i64,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub last_ip: Option<String>,
    /// Set when an admin rebinds the license. Devices seen before this
    /// moment no longer count against the device cap.
    pub bound_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A license joined with the flags of its owning customer and product.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LicenseWithOwners {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub license: License,
    pub customer_active: bool,
    pub product_active: bool,
    pub product_latest_version: Option<String>,
    pub product_update_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewLicense {
    pub license_key: String,
    pub customer_id: i64,
    pub product_id: i64,
    pub device_fingerprint: Option<String>,
    pub hardware_hash: Option<String>,
    pub mac_addresses: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LicenseFilter {
    pub status: Option<String>,
    pub customer_id: Option<i64>,
    pub product_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Mutations applied to a license row after a successful validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessStamp {
    pub license_id: i64,
    pub ip_address: String,
    pub mac_addresses: Vec<String>,
    pub hardware_hash: String,
    pub validated_at: DateTime<Utc>,
}
