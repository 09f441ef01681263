//! In-memory collaborators for driving the validation service in tests.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keygate_db::models::activation::{ActivationHistory, NewActivationLog};
use keygate_db::models::license::LicenseWithOwners;
use keygate_db::models::rule::LicenseRule;
use keygate_db::models::security_event::NewSecurityEvent;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::geo_service::GeoLookup;
use super::rate_limit_service::{GateVerdict, RateGate};
use super::validation_store::{AttemptRecord, ValidationStore};

#[derive(Default)]
pub struct MemoryStore {
    licenses: Mutex<HashMap<String, LicenseWithOwners>>,
    rules: Mutex<HashMap<i64, LicenseRule>>,
    logs: Mutex<Vec<NewActivationLog>>,
    events: Mutex<Vec<NewSecurityEvent>>,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn put_license(&self, license: LicenseWithOwners) {
        self.licenses
            .lock()
            .unwrap()
            .insert(license.license.license_key.clone(), license);
    }

    pub fn put_rule(&self, rule: LicenseRule) {
        self.rules.lock().unwrap().insert(rule.product_id, rule);
    }

    pub fn license(&self, key: &str) -> LicenseWithOwners {
        self.licenses.lock().unwrap()[key].clone()
    }

    pub fn logs(&self) -> Vec<NewActivationLog> {
        self.logs.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<NewSecurityEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn read(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl ValidationStore for MemoryStore {
    async fn find_license(&self, key: &str) -> Result<Option<LicenseWithOwners>> {
        self.read()?;
        Ok(self.licenses.lock().unwrap().get(key).cloned())
    }

    async fn find_rule(&self, product_id: i64) -> Result<Option<LicenseRule>> {
        self.read()?;
        Ok(self.rules.lock().unwrap().get(&product_id).cloned())
    }

    async fn history(
        &self,
        key: &str,
        devices_since: Option<DateTime<Utc>>,
        sessions_since: DateTime<Utc>,
    ) -> Result<ActivationHistory> {
        self.read()?;
        let logs = self.logs.lock().unwrap();
        let mut history = ActivationHistory::default();
        for log in logs.iter().filter(|l| l.license_key == key && l.valid) {
            let counts_as_device = devices_since.is_none_or(|since| log.created_at >= since);
            if counts_as_device && !history.known_devices.contains(&log.device_fingerprint) {
                history.known_devices.push(log.device_fingerprint.clone());
            }
            history.first_success_at = Some(
                history
                    .first_success_at
                    .map_or(log.created_at, |t| t.min(log.created_at)),
            );
            history.last_success_at = Some(
                history
                    .last_success_at
                    .map_or(log.created_at, |t| t.max(log.created_at)),
            );
            if let Some(session) = &log.session_id {
                if log.created_at >= sessions_since && !history.active_sessions.contains(session) {
                    history.active_sessions.push(session.clone());
                }
            }
        }
        Ok(history)
    }

    async fn commit(&self, record: &AttemptRecord) -> Result<()> {
        self.logs.lock().unwrap().push(record.log.clone());
        self.events
            .lock()
            .unwrap()
            .extend(record.events.iter().cloned());

        let mut licenses = self.licenses.lock().unwrap();
        if let Some((license_id, status)) = record.transition {
            for l in licenses.values_mut().filter(|l| l.license.id == license_id) {
                l.license.status = status.to_string();
            }
        }
        if let Some(stamp) = &record.success {
            for l in licenses.values_mut().filter(|l| l.license.id == stamp.license_id) {
                l.license.validation_count += 1;
                l.license.last_validated_at = Some(stamp.validated_at);
                l.license.last_ip = Some(stamp.ip_address.clone());
                l.license.mac_addresses = stamp.mac_addresses.clone();
                l.license.hardware_hash = Some(stamp.hardware_hash.clone());
            }
        }
        Ok(())
    }

    async fn record_event(&self, event: &NewSecurityEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Fixed-window counters without expiry.
pub struct MemoryGate {
    limit: u64,
    threshold: u64,
    hits: Mutex<HashMap<String, u64>>,
    failures: Mutex<HashMap<String, u64>>,
    blocked: Mutex<HashSet<String>>,
}

impl MemoryGate {
    pub fn new(limit: u64, threshold: u64) -> Self {
        Self {
            limit,
            threshold,
            hits: Mutex::default(),
            failures: Mutex::default(),
            blocked: Mutex::default(),
        }
    }

    pub fn failures(&self, ip: &str) -> u64 {
        self.failures.lock().unwrap().get(ip).copied().unwrap_or(0)
    }

    pub fn block(&self, ip: &str) {
        self.blocked.lock().unwrap().insert(ip.to_string());
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.blocked.lock().unwrap().contains(ip)
    }
}

#[async_trait]
impl RateGate for MemoryGate {
    async fn admit(&self, ip: &str) -> Result<GateVerdict> {
        if self.is_blocked(ip) {
            return Ok(GateVerdict::Blocked);
        }
        let mut hits = self.hits.lock().unwrap();
        let count = hits.entry(ip.to_string()).or_default();
        *count += 1;
        if *count > self.limit {
            return Ok(GateVerdict::Limited);
        }
        Ok(GateVerdict::Allowed)
    }

    async fn record_failure(&self, ip: &str) -> Result<bool> {
        let mut failures = self.failures.lock().unwrap();
        let count = failures.entry(ip.to_string()).or_default();
        *count += 1;
        if *count < self.threshold {
            return Ok(false);
        }
        failures.remove(ip);
        drop(failures);
        self.block(ip);
        Ok(true)
    }

    async fn unblock(&self, ip: &str) -> Result<bool> {
        self.failures.lock().unwrap().remove(ip);
        Ok(self.blocked.lock().unwrap().remove(ip))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub struct FixedGeo {
    countries: HashMap<IpAddr, String>,
}

impl FixedGeo {
    pub fn new(entries: impl IntoIterator<Item = (&'static str, &'static str)>) -> Self {
        Self {
            countries: entries
                .into_iter()
                .map(|(ip, code)| (ip.parse().unwrap(), code.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl GeoLookup for FixedGeo {
    async fn country_code(&self, ip: IpAddr) -> Option<String> {
        self.countries.get(&ip).cloned()
    }
}
