use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::activation::{ActivationHistory, ActivationLog, NewActivationLog};

#[derive(Clone, Debug)]
pub struct ActivationRepository {
    pool: PgPool,
}

impl ActivationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_tx<'a, E>(executor: E, log: &NewActivationLog) -> Result<Uuid>
    where
        E: sqlx::Executor<'a, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO activation_logs (
                id, license_key, license_id, device_fingerprint, session_id, ip_address,
                reported_ip, computer_name, os_version, product_version, valid, status,
                message, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(log.id)
        .bind(&log.license_key)
        .bind(log.license_id)
        .bind(&log.device_fingerprint)
        .bind(&log.session_id)
        .bind(&log.ip_address)
        .bind(&log.reported_ip)
        .bind(&log.computer_name)
        .bind(&log.os_version)
        .bind(&log.product_version)
        .bind(log.valid)
        .bind(&log.status)
        .bind(&log.message)
        .bind(log.created_at)
        .execute(executor)
        .await
        .context("Failed to write activation log")?;

        Ok(log.id)
    }

    pub async fn list_for_license(&self, key: &str, limit: i64) -> Result<Vec<ActivationLog>> {
        let logs = sqlx::query_as::<_, ActivationLog>(
            r#"
            SELECT id, license_key, license_id, device_fingerprint, session_id, ip_address,
                   reported_ip, computer_name, os_version, product_version, valid, status,
                   message, created_at
            FROM activation_logs
            WHERE license_key = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(key)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch activation logs")?;

        Ok(logs)
    }

    /// Aggregates the successful history of a license. Devices count only
    /// from `devices_since` on (the last rebind), sessions count as active
    /// when they validated at or after `sessions_since`.
    pub async fn history(
        &self,
        key: &str,
        devices_since: Option<DateTime<Utc>>,
        sessions_since: DateTime<Utc>,
    ) -> Result<ActivationHistory> {
        let (first_success_at, last_success_at): (Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
            sqlx::query_as(
                r#"
                SELECT MIN(created_at), MAX(created_at)
                FROM activation_logs
                WHERE license_key = $1 AND valid = TRUE
                "#,
            )
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .context("Failed to aggregate activation history")?;

        let known_devices: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT device_fingerprint
            FROM activation_logs
            WHERE license_key = $1 AND valid = TRUE
              AND ($2::timestamptz IS NULL OR created_at >= $2)
            "#,
        )
        .bind(key)
        .bind(devices_since)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch known devices")?;

        let active_sessions: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT session_id
            FROM activation_logs
            WHERE license_key = $1 AND valid = TRUE
              AND session_id IS NOT NULL AND created_at >= $2
            "#,
        )
        .bind(key)
        .bind(sessions_since)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch active sessions")?;

        Ok(ActivationHistory {
            known_devices,
            first_success_at,
            last_success_at,
            active_sessions,
        })
    }
}
