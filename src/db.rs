use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{error, info};

use crate::config::DatabaseConfig;
use crate::errors::StoreError;

/// Open the shared pool described by the configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(config.connect_options())
        .await
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS regions (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create regions table")?;

    // Regions cannot be deleted while districts still point at them
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS districts (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            region_id BIGINT NOT NULL REFERENCES regions(id) ON DELETE RESTRICT
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create districts table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS districts_region_id_idx ON districts (region_id)")
        .execute(pool)
        .await
        .context("Failed to create districts region index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Drop both hierarchy tables
pub async fn drop_database_schema(pool: &PgPool) -> Result<()> {
    info!("Dropping database schema...");

    sqlx::query("DROP TABLE IF EXISTS districts")
        .execute(pool)
        .await
        .context("Failed to drop districts table")?;
    sqlx::query("DROP TABLE IF EXISTS regions")
        .execute(pool)
        .await
        .context("Failed to drop regions table")?;

    Ok(())
}

/// Finish a write transaction: commit on success, roll back and report on failure.
///
/// Every store write ends here so a failed write never leaves the shared
/// connection inside an aborted transaction.
pub async fn finish<R>(
    tx: Transaction<'_, Postgres>,
    table: &str,
    result: Result<R, StoreError>,
) -> Result<R, StoreError> {
    match result {
        Ok(value) => match tx.commit().await {
            Ok(()) => Ok(value),
            Err(e) => {
                error!(table, error = %e, "Commit failed");
                Err(e.into())
            }
        },
        Err(err) => {
            error!(table, error = %err, "Write failed, rolling back");
            if let Err(e) = tx.rollback().await {
                error!(table, error = %e, "Rollback failed");
            }
            Err(err)
        }
    }
}
