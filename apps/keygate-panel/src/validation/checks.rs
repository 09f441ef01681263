use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use keygate_db::models::license::LicenseWithOwners;
use keygate_db::models::rule::LicenseRule;
use keygate_shared::ValidationStatus;
use serde_json::json;

use super::drift::{self, DriftSeverity};
use super::outcome::{Decision, EventDraft, Rejection, Severity, Transition, UpdateNotice, Verdict};
use super::vm::{self, VmConfidence};
use super::ValidationContext;

/// `Ok(Some(_))` continues and records an informational event.
pub type CheckResult = Result<Option<EventDraft>, Rejection>;
pub type Check = fn(&ValidationContext) -> CheckResult;

/// Rule checks in evaluation order.
pub const CHECKS: [(&str, Check); 9] = [
    ("hardware_fingerprint", check_fingerprint),
    ("vm_policy", check_vm_policy),
    ("device_limit", check_device_limit),
    ("offline_window", check_offline_window),
    ("duration", check_duration),
    ("concurrent_sessions", check_concurrent_sessions),
    ("geography", check_geography),
    ("time_window", check_time_window),
    ("hardware_drift", check_hardware_drift),
];

pub fn decide(ctx: &ValidationContext) -> Decision {
    let mut events = Vec::new();
    for (name, check) in CHECKS {
        match check(ctx) {
            Ok(None) => {}
            Ok(Some(note)) => events.push(note),
            Err(rejection) => {
                tracing::debug!(
                    check = name,
                    status = %rejection.status,
                    license = %ctx.input.license_key,
                    "validation rejected"
                );
                return Decision::rejected(rejection, events);
            }
        }
    }

    Decision {
        verdict: Verdict::Accepted {
            update: update_notice(&ctx.license, ctx.input.product_version.as_deref()),
        },
        events,
    }
}

/// Customer, product, status and expiry of the license itself.
pub fn check_lifecycle(license: &LicenseWithOwners, now: DateTime<Utc>) -> Result<(), Rejection> {
    if !license.customer_active {
        return Err(Rejection::lifecycle(
            ValidationStatus::Blocked,
            "Customer account is disabled",
        ));
    }
    if !license.product_active {
        return Err(Rejection::lifecycle(
            ValidationStatus::Invalid,
            "Product is no longer available",
        ));
    }

    match ValidationStatus::from_license_status(&license.license.status) {
        Some(ValidationStatus::Active) => {}
        Some(status) => {
            return Err(Rejection::lifecycle(status, format!("License is {}", status)));
        }
        None => {
            return Err(Rejection::lifecycle(
                ValidationStatus::Invalid,
                "License is in an unknown state",
            ));
        }
    }

    if let Some(expires_at) = license.license.expires_at {
        if expires_at <= now {
            return Err(
                Rejection::lifecycle(ValidationStatus::Expired, "License has expired")
                    .with_transition(Transition::Expire),
            );
        }
    }

    Ok(())
}

fn update_notice(license: &LicenseWithOwners, client_version: Option<&str>) -> Option<UpdateNotice> {
    let latest = license.product_latest_version.as_deref()?;
    let current = client_version?;
    if latest == current {
        return None;
    }
    Some(UpdateNotice {
        latest_version: latest.to_string(),
        update_url: license.product_update_url.clone(),
    })
}

fn check_fingerprint(ctx: &ValidationContext) -> CheckResult {
    let Some(bound) = ctx.license.license.device_fingerprint.as_deref() else {
        return Ok(None);
    };
    if bound.eq_ignore_ascii_case(&ctx.input.hardware_fingerprint) {
        return Ok(None);
    }

    Err(
        Rejection::policy(ValidationStatus::Invalid, "Hardware fingerprint mismatch").with_event(
            EventDraft::new(
                "hardware_change",
                Severity::High,
                json!({
                    "expected": bound,
                    "received": ctx.input.hardware_fingerprint,
                    "computer_name": ctx.input.computer_name,
                }),
            ),
        ),
    )
}

fn check_vm_policy(ctx: &ValidationContext) -> CheckResult {
    let Some(rule) = &ctx.rule else {
        return Ok(None);
    };
    if rule.allow_vm {
        return Ok(None);
    }

    let report = vm::assess(
        &ctx.input.mac_addresses,
        &ctx.input.computer_name,
        ctx.input.processor.as_deref(),
    );
    let details = json!({
        "score": report.score,
        "confidence": report.confidence(),
        "indicators": report.indicators,
    });

    if report.should_block() {
        let severity = if report.confidence() == VmConfidence::High {
            Severity::High
        } else {
            Severity::Medium
        };
        return Err(Rejection::policy(
            ValidationStatus::Blocked,
            "Virtual machines are not allowed for this product",
        )
        .with_event(EventDraft::new("vm_detected", severity, details)));
    }

    match report.confidence() {
        VmConfidence::None => Ok(None),
        _ => Ok(Some(EventDraft::new("vm_detected", Severity::Low, details))),
    }
}

fn check_device_limit(ctx: &ValidationContext) -> CheckResult {
    let Some(rule) = ctx.rule.as_ref().filter(|r| r.max_devices > 0) else {
        return Ok(None);
    };

    let known = &ctx.history.known_devices;
    if known.iter().any(|d| d == &ctx.input.hardware_fingerprint) {
        return Ok(None);
    }
    if known.len() < rule.max_devices as usize {
        return Ok(None);
    }

    Err(Rejection::policy(
        ValidationStatus::DeviceLimitExceeded,
        format!("Device limit of {} reached", rule.max_devices),
    )
    .with_event(EventDraft::new(
        "device_limit",
        Severity::Medium,
        json!({
            "max_devices": rule.max_devices,
            "known_devices": known.len(),
            "fingerprint": ctx.input.hardware_fingerprint,
        }),
    )))
}

fn check_offline_window(ctx: &ValidationContext) -> CheckResult {
    let Some(rule) = ctx.rule.as_ref().filter(|r| r.allow_offline_days >= 0) else {
        return Ok(None);
    };
    let Some(last) = ctx.history.last_success_at else {
        return Ok(None);
    };

    let days_offline = (ctx.now - last).num_days();
    if days_offline > i64::from(rule.allow_offline_days) {
        return Err(Rejection::policy(
            ValidationStatus::OfflineLimitExceeded,
            format!(
                "License requires online validation ({} days since last check, {} allowed)",
                days_offline, rule.allow_offline_days
            ),
        ));
    }
    Ok(None)
}

fn check_duration(ctx: &ValidationContext) -> CheckResult {
    let Some(rule) = ctx.rule.as_ref().filter(|r| r.max_days > 0) else {
        return Ok(None);
    };
    let Some(first) = ctx.history.first_success_at else {
        return Ok(None);
    };

    let days_used = (ctx.now - first).num_days();
    let allowed = i64::from(rule.max_days) + i64::from(rule.grace_period_days.max(0));
    if days_used > allowed {
        return Err(Rejection::policy(
            ValidationStatus::LicenseExpired,
            format!("License period of {} days has ended", allowed),
        ));
    }
    Ok(None)
}

fn check_concurrent_sessions(ctx: &ValidationContext) -> CheckResult {
    let Some(rule) = ctx.rule.as_ref().filter(|r| r.max_concurrent_sessions > 0) else {
        return Ok(None);
    };

    let active = &ctx.history.active_sessions;
    let resuming = ctx
        .input
        .session_id
        .as_ref()
        .is_some_and(|s| active.contains(s));
    if resuming || active.len() < rule.max_concurrent_sessions as usize {
        return Ok(None);
    }

    Err(Rejection::policy(
        ValidationStatus::ConcurrentLimitExceeded,
        format!(
            "Maximum of {} concurrent sessions reached",
            rule.max_concurrent_sessions
        ),
    ))
}

fn check_geography(ctx: &ValidationContext) -> CheckResult {
    let Some(rule) = ctx.rule.as_ref().filter(|r| !r.allowed_countries.is_empty()) else {
        return Ok(None);
    };

    let country = ctx.country.as_deref().unwrap_or("XX");
    if rule
        .allowed_countries
        .iter()
        .any(|c| c.eq_ignore_ascii_case(country))
    {
        return Ok(None);
    }

    Err(Rejection::policy(
        ValidationStatus::GeographicRestriction,
        format!("License is not valid in {}", country),
    )
    .with_event(EventDraft::new(
        "geo_blocked",
        Severity::Medium,
        json!({
            "country": country,
            "allowed": rule.allowed_countries,
        }),
    )))
}

/// Inclusive minute-of-day window. `start > end` wraps past midnight.
fn minute_in_window(minute: i32, start: Option<i32>, end: Option<i32>) -> bool {
    match (start, end) {
        (Some(s), Some(e)) if s <= e => minute >= s && minute <= e,
        (Some(s), Some(e)) => minute >= s || minute <= e,
        (Some(s), None) => minute >= s,
        (None, Some(e)) => minute <= e,
        (None, None) => true,
    }
}

fn local_offset(rule: &LicenseRule) -> FixedOffset {
    FixedOffset::east_opt(rule.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

fn check_time_window(ctx: &ValidationContext) -> CheckResult {
    let Some(rule) = &ctx.rule else {
        return Ok(None);
    };
    let restricted_days = !rule.allowed_weekdays.is_empty();
    let restricted_hours = rule.business_start_minute.is_some() || rule.business_end_minute.is_some();
    if !restricted_days && !restricted_hours {
        return Ok(None);
    }

    let local = ctx.now.with_timezone(&local_offset(rule));
    let weekday = local.weekday().num_days_from_sunday() as i16;
    if restricted_days && !rule.allowed_weekdays.contains(&weekday) {
        return Err(Rejection::policy(
            ValidationStatus::TimeRestriction,
            "License is not valid on this day",
        ));
    }

    let minute = (local.hour() * 60 + local.minute()) as i32;
    if !minute_in_window(minute, rule.business_start_minute, rule.business_end_minute) {
        return Err(Rejection::policy(
            ValidationStatus::TimeRestriction,
            "License is not valid at this time of day",
        ));
    }
    Ok(None)
}

/// Floating licenses are shared by several machines, so one last-seen MAC
/// list says nothing about drift.
fn check_hardware_drift(ctx: &ValidationContext) -> CheckResult {
    if ctx.license.license.device_fingerprint.is_none() {
        return Ok(None);
    }
    let drift = drift::compare(&ctx.license.license.mac_addresses, &ctx.input.mac_addresses);
    let details = json!({
        "added": drift.added,
        "removed": drift.removed,
        "severity": drift.severity,
    });

    match drift.severity {
        DriftSeverity::None => Ok(None),
        DriftSeverity::Low => Ok(Some(EventDraft::new("hardware_drift", Severity::Low, details))),
        DriftSeverity::Medium => Ok(Some(EventDraft::new(
            "hardware_drift",
            Severity::Medium,
            details,
        ))),
        DriftSeverity::High => Err(Rejection::policy(
            ValidationStatus::Suspended,
            "License suspended: all network adapters changed",
        )
        .with_event(EventDraft::new("hardware_drift", Severity::High, details))
        .with_transition(Transition::Suspend)),
    }
}
