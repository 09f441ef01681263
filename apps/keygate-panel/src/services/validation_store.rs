use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keygate_db::models::activation::{ActivationHistory, NewActivationLog};
use keygate_db::models::license::{LicenseWithOwners, SuccessStamp};
use keygate_db::models::rule::LicenseRule;
use keygate_db::models::security_event::NewSecurityEvent;
use keygate_db::repositories::activation_repo::ActivationRepository;
use keygate_db::repositories::license_repo::LicenseRepository;
use keygate_db::repositories::rule_repo::RuleRepository;
use keygate_db::repositories::security_event_repo::SecurityEventRepository;
use sqlx::PgPool;

/// Every write produced by one validation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub log: NewActivationLog,
    pub events: Vec<NewSecurityEvent>,
    /// `(license_id, new_status)`
    pub transition: Option<(i64, &'static str)>,
    pub success: Option<SuccessStamp>,
}

impl AttemptRecord {
    pub fn log_only(log: NewActivationLog) -> Self {
        Self {
            log,
            events: Vec::new(),
            transition: None,
            success: None,
        }
    }
}

#[async_trait]
pub trait ValidationStore: Send + Sync {
    async fn find_license(&self, key: &str) -> Result<Option<LicenseWithOwners>>;
    async fn find_rule(&self, product_id: i64) -> Result<Option<LicenseRule>>;
    /// `devices_since` limits the known devices to those seen after the
    /// last rebind.
    async fn history(
        &self,
        key: &str,
        devices_since: Option<DateTime<Utc>>,
        sessions_since: DateTime<Utc>,
    ) -> Result<ActivationHistory>;
    /// Applies the record atomically.
    async fn commit(&self, record: &AttemptRecord) -> Result<()>;
    async fn record_event(&self, event: &NewSecurityEvent) -> Result<()>;
}

#[derive(Clone)]
pub struct PgValidationStore {
    pool: PgPool,
    licenses: LicenseRepository,
    rules: RuleRepository,
    activations: ActivationRepository,
    events: SecurityEventRepository,
}

impl PgValidationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            licenses: LicenseRepository::new(pool.clone()),
            rules: RuleRepository::new(pool.clone()),
            activations: ActivationRepository::new(pool.clone()),
            events: SecurityEventRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl ValidationStore for PgValidationStore {
    async fn find_license(&self, key: &str) -> Result<Option<LicenseWithOwners>> {
        self.licenses.get_with_owners(key).await
    }

    async fn find_rule(&self, product_id: i64) -> Result<Option<LicenseRule>> {
        self.rules.get_by_product(product_id).await
    }

    async fn history(
        &self,
        key: &str,
        devices_since: Option<DateTime<Utc>>,
        sessions_since: DateTime<Utc>,
    ) -> Result<ActivationHistory> {
        self.activations
            .history(key, devices_since, sessions_since)
            .await
    }

    async fn commit(&self, record: &AttemptRecord) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open validation transaction")?;

        ActivationRepository::insert_tx(&mut *tx, &record.log).await?;
        for event in &record.events {
            SecurityEventRepository::insert_tx(&mut *tx, event).await?;
        }
        if let Some((license_id, status)) = record.transition {
            LicenseRepository::set_status_tx(&mut *tx, license_id, status).await?;
        }
        if let Some(stamp) = &record.success {
            LicenseRepository::record_success_tx(&mut *tx, stamp).await?;
        }

        tx.commit()
            .await
            .context("Failed to commit validation transaction")?;
        Ok(())
    }

    async fn record_event(&self, event: &NewSecurityEvent) -> Result<()> {
        self.events.insert(event).await
    }
}
