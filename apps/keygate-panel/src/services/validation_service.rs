use anyhow::Result;
use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use keygate_db::models::activation::NewActivationLog;
use keygate_db::models::license::{LicenseWithOwners, SuccessStamp};
use keygate_db::models::security_event::NewSecurityEvent;
use keygate_shared::{ValidationRequest, ValidationResponse, ValidationStatus};
use serde_json::json;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use super::geo_service::{GeoLookup, is_local_ip};
use super::rate_limit_service::{GateVerdict, RateGate};
use super::validation_store::{AttemptRecord, ValidationStore};
use crate::settings::ValidationSettings;
use crate::validation::{
    Decision, ValidationContext, ValidationInput, check_lifecycle, decide,
};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const AUDIT_FIELD_LIMIT: usize = 128;

/// HTTP status plus body for one validation attempt.
#[derive(Debug, Clone)]
pub struct ValidationReply {
    pub status: StatusCode,
    pub body: ValidationResponse,
}

/// Audit fields captured before the request is parsed, so that malformed
/// and failed attempts can still be logged.
#[derive(Debug, Clone)]
struct AttemptMeta {
    license_key: String,
    hardware_fingerprint: String,
    caller_ip: IpAddr,
}

fn truncate(value: &str) -> String {
    value.trim().chars().take(AUDIT_FIELD_LIMIT).collect()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl AttemptMeta {
    fn new(req: &ValidationRequest, caller_ip: IpAddr) -> Self {
        Self {
            license_key: truncate(&req.license_key),
            hardware_fingerprint: truncate(&req.hardware_fingerprint),
            caller_ip,
        }
    }

    /// Log row for an attempt that never reached a license.
    fn orphan_log(&self, status: ValidationStatus, message: &str, now: DateTime<Utc>) -> NewActivationLog {
        NewActivationLog {
            id: Uuid::new_v4(),
            license_key: self.license_key.clone(),
            license_id: None,
            device_fingerprint: self.hardware_fingerprint.clone(),
            session_id: None,
            ip_address: Some(self.caller_ip.to_string()),
            reported_ip: None,
            computer_name: None,
            os_version: None,
            product_version: None,
            valid: false,
            status: status.as_str().to_string(),
            message: message.to_string(),
            created_at: now,
        }
    }
}

fn reply(
    status: StatusCode,
    outcome: ValidationStatus,
    message: impl Into<String>,
    validation_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> ValidationReply {
    ValidationReply {
        status,
        body: ValidationResponse {
            valid: false,
            status: outcome,
            message: message.into(),
            expires_at: None,
            validation_id,
            session_id: None,
            update_available: false,
            update_url: None,
            server_time: now,
        },
    }
}

/// Runs one validation attempt end to end: syntax, rate gate, lifecycle,
/// rule checks, then a single transactional write of everything it produced.
#[derive(Clone)]
pub struct ValidationService {
    store: Arc<dyn ValidationStore>,
    gate: Arc<dyn RateGate>,
    geo: Arc<dyn GeoLookup>,
    settings: ValidationSettings,
}

impl ValidationService {
    pub fn new(
        store: Arc<dyn ValidationStore>,
        gate: Arc<dyn RateGate>,
        geo: Arc<dyn GeoLookup>,
        settings: ValidationSettings,
    ) -> Self {
        Self {
            store,
            gate,
            geo,
            settings,
        }
    }

    pub async fn validate(&self, req: ValidationRequest, caller_ip: IpAddr) -> ValidationReply {
        let now = Utc::now();
        let meta = AttemptMeta::new(&req, caller_ip);

        match self.process(req, &meta, now).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    license = %meta.license_key,
                    ip = %caller_ip,
                    "License validation failed: {:#}",
                    e
                );
                let log = meta.orphan_log(ValidationStatus::Invalid, INTERNAL_ERROR_MESSAGE, now);
                let validation_id = log.id;
                if let Err(e) = self.store.commit(&AttemptRecord::log_only(log)).await {
                    tracing::warn!("Failed to write audit row after internal error: {:#}", e);
                }
                reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ValidationStatus::Invalid,
                    INTERNAL_ERROR_MESSAGE,
                    Some(validation_id),
                    now,
                )
            }
        }
    }

    /// Answers a body that could not be decoded at all.
    pub async fn reject_unreadable(&self, caller_ip: IpAddr, message: &str) -> ValidationReply {
        let now = Utc::now();
        let meta = AttemptMeta {
            license_key: String::new(),
            hardware_fingerprint: String::new(),
            caller_ip,
        };
        let log = meta.orphan_log(ValidationStatus::Invalid, message, now);
        let validation_id = log.id;
        if let Err(e) = self.store.commit(&AttemptRecord::log_only(log)).await {
            tracing::warn!("Failed to write audit row for unreadable request: {:#}", e);
        }
        self.note_failure(caller_ip, None).await;
        reply(
            StatusCode::BAD_REQUEST,
            ValidationStatus::Invalid,
            message,
            Some(validation_id),
            now,
        )
    }

    async fn process(
        &self,
        req: ValidationRequest,
        meta: &AttemptMeta,
        now: DateTime<Utc>,
    ) -> Result<ValidationReply> {
        let input = match ValidationInput::parse(req, meta.caller_ip) {
            Ok(input) => input,
            Err(err) => {
                let message = err.to_string();
                tracing::debug!(ip = %meta.caller_ip, "Malformed validation request: {}", message);
                return self
                    .finish_orphan(meta, StatusCode::BAD_REQUEST, ValidationStatus::Invalid, &message, true, now)
                    .await;
            }
        };

        match self.gate.admit(&meta.caller_ip.to_string()).await? {
            GateVerdict::Allowed => {}
            GateVerdict::Limited => {
                return self
                    .finish_orphan(
                        meta,
                        StatusCode::TOO_MANY_REQUESTS,
                        ValidationStatus::Blocked,
                        "Too many validation requests",
                        false,
                        now,
                    )
                    .await;
            }
            GateVerdict::Blocked => {
                return self
                    .finish_orphan(
                        meta,
                        StatusCode::FORBIDDEN,
                        ValidationStatus::Blocked,
                        "IP address is temporarily blocked",
                        false,
                        now,
                    )
                    .await;
            }
        }

        let Some(license) = self.store.find_license(&input.license_key).await? else {
            return self
                .finish_orphan(meta, StatusCode::OK, ValidationStatus::Invalid, "License not found", true, now)
                .await;
        };

        if let Err(rejection) = check_lifecycle(&license, now) {
            let decision = Decision::rejected(rejection, Vec::new());
            return self.finish(input, license, decision, now).await;
        }

        let rule = self.store.find_rule(license.license.product_id).await?;
        let sessions_since = now - Duration::seconds(self.settings.session_window_secs);
        let history = self
            .store
            .history(&input.license_key, license.license.bound_at, sessions_since)
            .await?;
        let country = match &rule {
            Some(r) if !r.allowed_countries.is_empty() => self.resolve_country(input.caller_ip).await,
            _ => None,
        };

        let ctx = ValidationContext {
            input,
            license,
            rule,
            history,
            country,
            now,
        };
        let decision = decide(&ctx);
        self.finish(ctx.input, ctx.license, decision, now).await
    }

    async fn resolve_country(&self, ip: IpAddr) -> Option<String> {
        if is_local_ip(ip) {
            return Some(self.settings.default_country.clone());
        }
        self.geo.country_code(ip).await
    }

    async fn finish_orphan(
        &self,
        meta: &AttemptMeta,
        http_status: StatusCode,
        outcome: ValidationStatus,
        message: &str,
        counts_as_failure: bool,
        now: DateTime<Utc>,
    ) -> Result<ValidationReply> {
        let log = meta.orphan_log(outcome, message, now);
        let validation_id = log.id;
        self.store.commit(&AttemptRecord::log_only(log)).await?;
        if counts_as_failure {
            self.note_failure(meta.caller_ip, None).await;
        }
        Ok(reply(http_status, outcome, message, Some(validation_id), now))
    }

    async fn finish(
        &self,
        input: ValidationInput,
        license: LicenseWithOwners,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<ValidationReply> {
        let valid = decision.is_valid();
        let status = decision.status();
        let license_id = license.license.id;
        let ip = input.caller_ip.to_string();

        let session_id = if valid {
            Some(
                input
                    .session_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            )
        } else {
            input.session_id.clone()
        };

        let log = NewActivationLog {
            id: Uuid::new_v4(),
            license_key: input.license_key.clone(),
            license_id: Some(license_id),
            device_fingerprint: input.hardware_fingerprint.clone(),
            session_id: session_id.clone(),
            ip_address: Some(ip.clone()),
            reported_ip: input.reported_ip.clone(),
            computer_name: non_empty(&input.computer_name),
            os_version: non_empty(&input.os_version),
            product_version: input.product_version.clone(),
            valid,
            status: status.as_str().to_string(),
            message: decision.message().to_string(),
            created_at: now,
        };
        let validation_id = log.id;

        let events = decision
            .events
            .iter()
            .map(|e| NewSecurityEvent {
                event_type: e.event_type.to_string(),
                severity: e.severity.as_str().to_string(),
                customer_id: Some(license.license.customer_id),
                license_id: Some(license_id),
                ip_address: Some(ip.clone()),
                details: e.details.clone(),
            })
            .collect();

        let transition = decision
            .transition()
            .map(|t| (license_id, t.target_status()));
        let success = valid.then(|| SuccessStamp {
            license_id,
            ip_address: ip.clone(),
            mac_addresses: input.mac_addresses.clone(),
            hardware_hash: input.hardware_hash.clone(),
            validated_at: now,
        });

        self.store
            .commit(&AttemptRecord {
                log,
                events,
                transition,
                success,
            })
            .await?;

        if let Some((_, target)) = transition {
            tracing::warn!(license = %input.license_key, status = target, "License status changed by validation");
        }

        if valid {
            tracing::debug!(license = %input.license_key, ip = %ip, "License validated");
        } else {
            self.note_failure(input.caller_ip, Some(&license)).await;
        }

        let update = decision.update();
        Ok(ValidationReply {
            status: decision.http_status(),
            body: ValidationResponse {
                valid,
                status,
                message: decision.message().to_string(),
                expires_at: license.license.expires_at,
                validation_id: Some(validation_id),
                session_id: if valid { session_id } else { None },
                update_available: update.is_some(),
                update_url: update.and_then(|u| u.update_url.clone()),
                server_time: now,
            },
        })
    }

    /// Counts a failed attempt against the caller IP. Never fails the request.
    async fn note_failure(&self, ip: IpAddr, license: Option<&LicenseWithOwners>) {
        let ip_text = ip.to_string();
        match self.gate.record_failure(&ip_text).await {
            Ok(false) => {}
            Ok(true) => {
                let event = NewSecurityEvent {
                    event_type: "ip_blocked".to_string(),
                    severity: "high".to_string(),
                    customer_id: license.map(|l| l.license.customer_id),
                    license_id: license.map(|l| l.license.id),
                    ip_address: Some(ip_text.clone()),
                    details: json!({ "reason": "repeated validation failures" }),
                };
                if let Err(e) = self.store.record_event(&event).await {
                    tracing::warn!("Failed to record ip_blocked event for {}: {:#}", ip_text, e);
                }
            }
            Err(e) => tracing::warn!("Failed to count validation failure for {}: {:#}", ip_text, e),
        }
    }
}
