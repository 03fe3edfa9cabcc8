//! Database module: pool, migrations and the PostgreSQL import store

pub mod pg_store;
pub mod queries;

pub use pg_store::PgAccrualStore;

use anyhow::Result;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Create a database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Migrations embedded from `./migrations`
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run pending database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running accrual schema migrations...");
    MIGRATOR.run(pool).await?;
    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrations() {
        let versions: Vec<i64> = MIGRATOR
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| m.version)
            .collect();
        assert_eq!(versions, vec![20260101000000]);

        let schema = &MIGRATOR.iter().next().unwrap().sql;
        assert!(schema.contains("tenant_accruals"));
        assert!(schema.contains("content_hash"));
    }
}
