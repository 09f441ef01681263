use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::product::{Product, ProductInput};

#[derive(Clone, Debug)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: &ProductInput) -> Result<Product> {
        let rec = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (code, name, latest_version, update_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, code, name, latest_version, update_url, is_active, created_at
            "#,
        )
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.latest_version)
        .bind(&input.update_url)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create product")?;

        Ok(rec)
    }

    pub async fn get_all(&self) -> Result<Vec<Product>> {
        let recs = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, code, name, latest_version, update_url, is_active, created_at
            FROM products
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch products")?;

        Ok(recs)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Product>> {
        let rec = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, code, name, latest_version, update_url, is_active, created_at
            FROM products WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch product by ID")?;

        Ok(rec)
    }

    pub async fn code_exists(&self, code: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE code = $1)")
                .bind(code)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check product code")?;
        Ok(exists)
    }

    pub async fn update(&self, id: i64, input: &ProductInput) -> Result<Option<Product>> {
        let rec = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET code = $1, name = $2, latest_version = $3, update_url = $4
            WHERE id = $5
            RETURNING id, code, name, latest_version, update_url, is_active, created_at
            "#,
        )
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.latest_version)
        .bind(&input.update_url)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update product")?;

        Ok(rec)
    }

    pub async fn toggle_active(&self, id: i64) -> Result<Option<Product>> {
        let rec = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET is_active = NOT is_active
            WHERE id = $1
            RETURNING id, code, name, latest_version, update_url, is_active, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to toggle product")?;

        Ok(rec)
    }
}
