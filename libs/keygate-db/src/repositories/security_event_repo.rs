use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::security_event::{NewSecurityEvent, SecurityEvent};

#[derive(Clone, Debug)]
pub struct SecurityEventRepository {
    pool: PgPool,
}

impl SecurityEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, event: &NewSecurityEvent) -> Result<()> {
        Self::insert_tx(&self.pool, event).await
    }

    pub async fn insert_tx<'a, E>(executor: E, event: &NewSecurityEvent) -> Result<()>
    where
        E: sqlx::Executor<'a, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO security_events (event_type, severity, customer_id, license_id, ip_address, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&event.event_type)
        .bind(&event.severity)
        .bind(event.customer_id)
        .bind(event.license_id)
        .bind(&event.ip_address)
        .bind(&event.details)
        .execute(executor)
        .await
        .context("Failed to record security event")?;

        Ok(())
    }

    pub async fn list(&self, severity: Option<&str>, limit: i64) -> Result<Vec<SecurityEvent>> {
        let mut query = String::from(
            "SELECT id, event_type, severity, customer_id, license_id, ip_address, details, created_at
             FROM security_events",
        );

        let mut bind_index = 1;
        if severity.is_some() {
            query.push_str(&format!(" WHERE severity = ${}", bind_index));
            bind_index += 1;
        }
        query.push_str(&format!(" ORDER BY created_at DESC LIMIT ${}", bind_index));

        let mut q = sqlx::query_as::<_, SecurityEvent>(&query);
        if let Some(severity) = severity {
            q = q.bind(severity);
        }
        q = q.bind(limit);

        let events = q
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch security events")?;
        Ok(events)
    }
}
