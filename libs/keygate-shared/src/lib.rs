//! Wire types shared between the panel and license clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Machine-readable outcome of a validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Active,
    Suspended,
    Expired,
    Revoked,
    Invalid,
    Blocked,
    DeviceLimitExceeded,
    OfflineLimitExceeded,
    LicenseExpired,
    ConcurrentLimitExceeded,
    GeographicRestriction,
    TimeRestriction,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Invalid => "invalid",
            Self::Blocked => "blocked",
            Self::DeviceLimitExceeded => "device_limit_exceeded",
            Self::OfflineLimitExceeded => "offline_limit_exceeded",
            Self::LicenseExpired => "license_expired",
            Self::ConcurrentLimitExceeded => "concurrent_limit_exceeded",
            Self::GeographicRestriction => "geographic_restriction",
            Self::TimeRestriction => "time_restriction",
        }
    }

    /// Parses the lifecycle column of a license row. Only the four
    /// lifecycle states are accepted.
    pub fn from_license_status(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "expired" => Some(Self::Expired),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub license_key: String,
    pub hardware_fingerprint: String,
    #[serde(default)]
    pub hardware_hash: String,
    #[serde(default)]
    pub mac_addresses: Vec<String>,
    #[serde(default)]
    pub computer_name: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub processor: Option<String>,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Address the client believes it has. Recorded for auditing only.
    #[serde(default, alias = "ip")]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub status: ValidationStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub update_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,
    pub server_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ValidationStatus::ConcurrentLimitExceeded).unwrap();
        assert_eq!(json, "\"concurrent_limit_exceeded\"");
        assert_eq!(
            ValidationStatus::ConcurrentLimitExceeded.as_str(),
            "concurrent_limit_exceeded"
        );
    }

    #[test]
    fn lifecycle_parse_rejects_policy_statuses() {
        assert_eq!(
            ValidationStatus::from_license_status("revoked"),
            Some(ValidationStatus::Revoked)
        );
        assert_eq!(ValidationStatus::from_license_status("time_restriction"), None);
    }

    #[test]
    fn request_accepts_minimal_body() {
        let req: ValidationRequest = serde_json::from_str(
            r#"{"license_key":"ABCD-EFGH-IJKL-MNOP","hardware_fingerprint":"ab","ip":"10.0.0.2"}"#,
        )
        .unwrap();
        assert!(req.mac_addresses.is_empty());
        assert_eq!(req.ip_address.as_deref(), Some("10.0.0.2"));
    }
}
