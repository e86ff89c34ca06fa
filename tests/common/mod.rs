//! Shared database setup for integration tests.
//!
//! Each test gets its own Postgres schema so tests can run in parallel
//! against one `DATABASE_URL`.
#![allow(dead_code)]

use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use region_admin::db::init_database_schema;
use region_admin::models::Hierarchy;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool};

/// Run a test body against a fresh schema, or skip when no database is
/// configured. The body runs in its own task so the schema is dropped even
/// when an assertion panics; the panic is then re-raised.
macro_rules! skip_if_no_db {
    ($test_fn:expr) => {
        match common::setup_test_db().await {
            Ok(db) => {
                let outcome = tokio::spawn({
                    let db = db.clone();
                    async move { $test_fn(&db).await }
                })
                .await;
                db.teardown().await;
                match outcome {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(e) => Err(anyhow::anyhow!(e)),
                }
            }
            Err(_) => {
                eprintln!("Skipping test: Database not available");
                Ok(())
            }
        }
    };
}

static SCHEMA_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone)]
pub struct TestDb {
    pub pool: PgPool,
    schema: String,
    options: PgConnectOptions,
}

impl TestDb {
    pub fn hierarchy(&self) -> Hierarchy {
        Hierarchy::new(self.pool.clone())
    }

    /// Drop the test schema; failures only leave a stray schema behind
    pub async fn teardown(self) {
        self.pool.close().await;
        if let Ok(mut conn) = PgConnection::connect_with(&self.options).await {
            let _ = sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema))
                .execute(&mut conn)
                .await;
        }
    }
}

fn unique_schema() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!(
        "test_{}_{}_{}",
        std::process::id(),
        SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst),
        nanos
    )
}

pub async fn setup_test_db() -> Result<TestDb> {
    // Skip tests if no DATABASE_URL is provided
    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping database tests: DATABASE_URL not set");
            return Err(anyhow::anyhow!("Test database not configured"));
        }
    };

    let options = PgConnectOptions::from_str(&database_url).context("Invalid DATABASE_URL")?;
    let schema = unique_schema();

    let mut conn = PgConnection::connect_with(&options)
        .await
        .context("Failed to connect to test database")?;
    sqlx::query(&format!("CREATE SCHEMA {schema}"))
        .execute(&mut conn)
        .await?;
    conn.close().await?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect_with(options.clone().options([("search_path", schema.as_str())]))
        .await
        .context("Failed to open test pool")?;

    init_database_schema(&pool).await?;

    Ok(TestDb {
        pool,
        schema,
        options,
    })
}
