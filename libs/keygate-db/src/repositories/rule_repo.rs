use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::rule::{LicenseRule, LicenseRuleInput};

const RULE_COLUMNS: &str = "id, product_id, max_concurrent_sessions, max_devices, max_days, \
    grace_period_days, allow_offline_days, allow_vm, allowed_countries, utc_offset_minutes, \
    allowed_weekdays, business_start_minute, business_end_minute, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct RuleRepository {
    pool: PgPool,
}

impl RuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_product(&self, product_id: i64) -> Result<Option<LicenseRule>> {
        let query = format!("SELECT {RULE_COLUMNS} FROM license_rules WHERE product_id = $1");
        let rec = sqlx::query_as::<_, LicenseRule>(&query)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch license rule")?;

        Ok(rec)
    }

    /// Inserts or replaces the single rule set of a product.
    pub async fn upsert(&self, product_id: i64, input: &LicenseRuleInput) -> Result<LicenseRule> {
        let countries: Vec<String> = input
            .allowed_countries
            .iter()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();

        let query = format!(
            r#"
            INSERT INTO license_rules (
                product_id, max_concurrent_sessions, max_devices, max_days, grace_period_days,
                allow_offline_days, allow_vm, allowed_countries, utc_offset_minutes,
                allowed_weekdays, business_start_minute, business_end_minute
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (product_id) DO UPDATE SET
                max_concurrent_sessions = excluded.max_concurrent_sessions,
                max_devices = excluded.max_devices,
                max_days = excluded.max_days,
                grace_period_days = excluded.grace_period_days,
                allow_offline_days = excluded.allow_offline_days,
                allow_vm = excluded.allow_vm,
                allowed_countries = excluded.allowed_countries,
                utc_offset_minutes = excluded.utc_offset_minutes,
                allowed_weekdays = excluded.allowed_weekdays,
                business_start_minute = excluded.business_start_minute,
                business_end_minute = excluded.business_end_minute,
                updated_at = CURRENT_TIMESTAMP
            RETURNING {RULE_COLUMNS}
            "#
        );

        let rec = sqlx::query_as::<_, LicenseRule>(&query)
            .bind(product_id)
            .bind(input.max_concurrent_sessions)
            .bind(input.max_devices)
            .bind(input.max_days)
            .bind(input.grace_period_days)
            .bind(input.allow_offline_days)
            .bind(input.allow_vm)
            .bind(&countries)
            .bind(input.utc_offset_minutes)
            .bind(&input.allowed_weekdays)
            .bind(input.business_start_minute)
            .bind(input.business_end_minute)
            .fetch_one(&self.pool)
            .await
            .context("Failed to save license rule")?;

        Ok(rec)
    }

    pub async fn delete(&self, product_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM license_rules WHERE product_id = $1")
            .bind(product_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete license rule")?;

        Ok(result.rows_affected() > 0)
    }
}
