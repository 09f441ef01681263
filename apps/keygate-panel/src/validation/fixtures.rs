use chrono::{DateTime, Duration, Utc};
use keygate_db::models::activation::ActivationHistory;
use keygate_db::models::license::{License, LicenseWithOwners};
use keygate_db::models::rule::LicenseRule;

use super::input::ValidationInput;
use super::ValidationContext;

pub const KEY: &str = "AB12-CD34-EF56-GH78";
pub const MAC: &str = "3C:22:FB:10:20:30";

pub fn fingerprint(c: char) -> String {
    c.to_string().repeat(64)
}

pub fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

pub fn license() -> LicenseWithOwners {
    let now = Utc::now();
    LicenseWithOwners {
        license: License {
            id: 1,
            license_key: KEY.to_string(),
            customer_id: 10,
            product_id: 20,
            device_fingerprint: Some(fingerprint('a')),
            hardware_hash: Some("hw-hash".into()),
            mac_addresses: vec![MAC.to_string()],
            status: "active".into(),
            expires_at: None,
            validation_count: 0,
            last_validated_at: None,
            last_ip: None,
            bound_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        },
        customer_active: true,
        product_active: true,
        product_latest_version: None,
        product_update_url: None,
    }
}

/// A rule with every restriction disabled.
pub fn rule() -> LicenseRule {
    let now = Utc::now();
    LicenseRule {
        id: 1,
        product_id: 20,
        max_concurrent_sessions: 0,
        max_devices: 0,
        max_days: 0,
        grace_period_days: 0,
        allow_offline_days: -1,
        allow_vm: true,
        allowed_countries: Vec::new(),
        utc_offset_minutes: 0,
        allowed_weekdays: Vec::new(),
        business_start_minute: None,
        business_end_minute: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn input() -> ValidationInput {
    ValidationInput {
        license_key: KEY.to_string(),
        hardware_fingerprint: fingerprint('a'),
        hardware_hash: "hw-hash".into(),
        mac_addresses: vec![MAC.to_string()],
        computer_name: "OFFICE-DESK-7".into(),
        os_version: "Windows 11 Pro".into(),
        processor: Some("Intel(R) Core(TM) i7-1165G7".into()),
        product_version: None,
        session_id: None,
        caller_ip: "203.0.113.7".parse().unwrap(),
        reported_ip: None,
    }
}

pub fn context() -> ValidationContext {
    ValidationContext {
        input: input(),
        license: license(),
        rule: None,
        history: ActivationHistory::default(),
        country: None,
        now: Utc::now(),
    }
}
