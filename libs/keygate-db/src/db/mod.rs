use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};

pub fn check_database_url(database_url: &str) -> Result<()> {
    if !database_url.starts_with("postgres://") && !database_url.starts_with("postgresql://") {
        return Err(anyhow::anyhow!(
            "DATABASE_URL must start with postgres:// or postgresql://"
        ));
    }
    Ok(())
}

pub async fn init_db(database_url: &str, max_connections: u32) -> Result<PgPool> {
    check_database_url(database_url)?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database ready, migrations applied");

    Ok(pool)
}

pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Database ping failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_postgres_urls() {
        assert!(check_database_url("sqlite://panel.db").is_err());
        assert!(check_database_url("postgres://u:p@localhost/keygate").is_ok());
        assert!(check_database_url("postgresql://localhost/keygate").is_ok());
    }
}
