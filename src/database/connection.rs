use super::error::StoreResult;
use super::MIGRATOR;
use crate::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::info;

/// Open a pool for `url` and, when configured, apply pending migrations
pub async fn connect(url: &str, config: &DatabaseConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(url)
        .await?;

    if config.run_migrations {
        MIGRATOR.run(&pool).await?;
        info!("✅ Database migrations applied");
    }

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> StoreResult<bool> {
    let row = sqlx::query("SELECT 1 as health").fetch_one(pool).await?;
    let health: i32 = row.get("health");
    Ok(health == 1)
}
