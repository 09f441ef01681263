use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::license::{License, LicenseFilter, LicenseWithOwners, NewLicense, SuccessStamp};

const LICENSE_COLUMNS: &str = "id, license_key, customer_id, product_id, device_fingerprint, \
    hardware_hash, mac_addresses, status, expires_at, validation_count, last_validated_at, \
    last_ip, bound_at, notes, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct LicenseRepository {
    pool: PgPool,
}

impl LicenseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewLicense) -> Result<License> {
        let query = format!(
            r#"
            INSERT INTO licenses (
                license_key, customer_id, product_id, device_fingerprint,
                hardware_hash, mac_addresses, expires_at, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {LICENSE_COLUMNS}
            "#
        );

        let rec = sqlx::query_as::<_, License>(&query)
            .bind(&new.license_key)
            .bind(new.customer_id)
            .bind(new.product_id)
            .bind(&new.device_fingerprint)
            .bind(&new.hardware_hash)
            .bind(&new.mac_addresses)
            .bind(new.expires_at)
            .bind(&new.notes)
            .fetch_one(&self.pool)
            .await
            .context("Failed to create license")?;

        Ok(rec)
    }

    pub async fn key_exists(&self, key: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM licenses WHERE license_key = $1)")
                .bind(key)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check license key")?;
        Ok(exists)
    }

    pub async fn get_by_key(&self, key: &str) -> Result<Option<License>> {
        let query = format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE license_key = $1");
        let rec = sqlx::query_as::<_, License>(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch license by key")?;

        Ok(rec)
    }

    pub async fn get_with_owners(&self, key: &str) -> Result<Option<LicenseWithOwners>> {
        let rec = sqlx::query_as::<_, LicenseWithOwners>(
            r#"
            SELECT
                l.id, l.license_key, l.customer_id, l.product_id, l.device_fingerprint,
                l.hardware_hash, l.mac_addresses, l.status, l.expires_at, l.validation_count,
                l.last_validated_at, l.last_ip, l.bound_at, l.notes, l.created_at, l.updated_at,
                c.is_active AS customer_active,
                p.is_active AS product_active,
                p.latest_version AS product_latest_version,
                p.update_url AS product_update_url
            FROM licenses l
            JOIN customers c ON c.id = l.customer_id
            JOIN products p ON p.id = l.product_id
            WHERE l.license_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch license with owners")?;

        Ok(rec)
    }

    pub async fn list(&self, filter: &LicenseFilter) -> Result<Vec<License>> {
        let mut query = format!("SELECT {LICENSE_COLUMNS} FROM licenses");
        let mut clauses = Vec::new();
        let mut bind_index = 1;

        if filter.status.is_some() {
            clauses.push(format!("status = ${}", bind_index));
            bind_index += 1;
        }
        if filter.customer_id.is_some() {
            clauses.push(format!("customer_id = ${}", bind_index));
            bind_index += 1;
        }
        if filter.product_id.is_some() {
            clauses.push(format!("product_id = ${}", bind_index));
            bind_index += 1;
        }
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str(&format!(
            " ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            bind_index,
            bind_index + 1
        ));

        let mut q = sqlx::query_as::<_, License>(&query);
        if let Some(status) = &filter.status {
            q = q.bind(status);
        }
        if let Some(customer_id) = filter.customer_id {
            q = q.bind(customer_id);
        }
        if let Some(product_id) = filter.product_id {
            q = q.bind(product_id);
        }
        q = q
            .bind(filter.limit.unwrap_or(100).clamp(1, 1000))
            .bind(filter.offset.unwrap_or(0).max(0));

        let recs = q
            .fetch_all(&self.pool)
            .await
            .context("Failed to list licenses")?;
        Ok(recs)
    }

    pub async fn set_status(&self, key: &str, status: &str) -> Result<Option<License>> {
        let query = format!(
            r#"
            UPDATE licenses SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE license_key = $2
            RETURNING {LICENSE_COLUMNS}
            "#
        );
        let rec = sqlx::query_as::<_, License>(&query)
            .bind(status)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to update license status")?;

        Ok(rec)
    }

    pub async fn set_expiry(
        &self,
        key: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<License>> {
        // An expired license whose new expiry lies in the future becomes usable again.
        let query = format!(
            r#"
            UPDATE licenses SET
                expires_at = $1,
                status = CASE
                    WHEN status = 'expired' AND ($1 IS NULL OR $1 > CURRENT_TIMESTAMP) THEN 'active'
                    ELSE status
                END,
                updated_at = CURRENT_TIMESTAMP
            WHERE license_key = $2
            RETURNING {LICENSE_COLUMNS}
            "#
        );
        let rec = sqlx::query_as::<_, License>(&query)
            .bind(expires_at)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to update license expiry")?;

        Ok(rec)
    }

    pub async fn rebind(
        &self,
        key: &str,
        device_fingerprint: Option<&str>,
        hardware_hash: Option<&str>,
        mac_addresses: &[String],
    ) -> Result<Option<License>> {
        let query = format!(
            r#"
            UPDATE licenses SET
                device_fingerprint = $1,
                hardware_hash = $2,
                mac_addresses = $3,
                bound_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE license_key = $4
            RETURNING {LICENSE_COLUMNS}
            "#
        );
        let rec = sqlx::query_as::<_, License>(&query)
            .bind(device_fingerprint)
            .bind(hardware_hash)
            .bind(mac_addresses)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to rebind license")?;

        Ok(rec)
    }

    pub async fn set_status_tx<'a, E>(executor: E, license_id: i64, status: &str) -> Result<()>
    where
        E: sqlx::Executor<'a, Database = sqlx::Postgres>,
    {
        sqlx::query(
            "UPDATE licenses SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
        )
        .bind(status)
        .bind(license_id)
        .execute(executor)
        .await
        .context("Failed to transition license status")?;

        Ok(())
    }

    pub async fn record_success_tx<'a, E>(executor: E, stamp: &SuccessStamp) -> Result<()>
    where
        E: sqlx::Executor<'a, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE licenses SET
                validation_count = validation_count + 1,
                last_validated_at = $1,
                last_ip = $2,
                mac_addresses = $3,
                hardware_hash = COALESCE(NULLIF($4, ''), hardware_hash),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $5
            "#,
        )
        .bind(stamp.validated_at)
        .bind(&stamp.ip_address)
        .bind(&stamp.mac_addresses)
        .bind(&stamp.hardware_hash)
        .bind(stamp.license_id)
        .execute(executor)
        .await
        .context("Failed to stamp license validation")?;

        Ok(())
    }
}
