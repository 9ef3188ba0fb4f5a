use std::time::Duration;

use crate::{config::DatabaseConfig, error::Result};
use sqlx::{PgPool, migrate::Migrator, postgres::PgPoolOptions};

static MIGRATOR: Migrator = sqlx::migrate!();

/// Connects and brings the schema up to date before the pool is handed out.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await?;

    MIGRATOR.run(&pool).await.map_err(sqlx::Error::from)?;

    tracing::info!(
        "Database ready: {} migrations applied, {} max connections",
        MIGRATOR.iter().count(),
        config.max_connections
    );

    Ok(pool)
}

/// Latest successfully applied migration, which also proves the pool can reach Postgres.
pub async fn schema_version(pool: &PgPool) -> Result<Option<i64>> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success")
            .fetch_one(pool)
            .await?;

    Ok(version)
}
