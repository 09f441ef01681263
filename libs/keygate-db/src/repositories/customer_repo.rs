use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::customer::{Customer, CustomerInput};

#[derive(Clone, Debug)]
pub struct CustomerRepository {
    pool: PgPool,
}

impl CustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: &CustomerInput) -> Result<Customer> {
        let rec = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (name, email, company)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, company, is_active, created_at
            "#,
        )
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.company)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create customer")?;

        Ok(rec)
    }

    pub async fn get_all(&self) -> Result<Vec<Customer>> {
        let recs = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, company, is_active, created_at FROM customers ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch customers")?;

        Ok(recs)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Customer>> {
        let rec = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, company, is_active, created_at FROM customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch customer by ID")?;

        Ok(rec)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM customers WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check customer email")?;
        Ok(exists)
    }

    pub async fn update(&self, id: i64, input: &CustomerInput) -> Result<Option<Customer>> {
        let rec = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers SET name = $1, email = $2, company = $3
            WHERE id = $4
            RETURNING id, name, email, company, is_active, created_at
            "#,
        )
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.company)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update customer")?;

        Ok(rec)
    }

    /// Flips `is_active` and returns the updated row.
    pub async fn toggle_active(&self, id: i64) -> Result<Option<Customer>> {
        let rec = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers SET is_active = NOT is_active
            WHERE id = $1
            RETURNING id, name, email, company, is_active, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to toggle customer")?;

        Ok(rec)
    }
}
