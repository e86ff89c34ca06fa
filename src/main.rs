use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use region_admin::bot::{self, AdminRouter};
use region_admin::config::{Config, LogFormat};
use region_admin::db;
use region_admin::dialogue::SessionStore;
use region_admin::importer::Importer;
use region_admin::models::Hierarchy;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    info!("Starting Region Admin Telegram Bot");
    debug!(config = ?config, "Loaded configuration");

    info!(
        host = %config.database.host,
        database = %config.database.database,
        "Connecting to database"
    );
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;

    db::init_database_schema(&pool).await?;

    let router = Arc::new(AdminRouter::new(
        Hierarchy::new(pool.clone()),
        Importer::new(pool, config.import.dir.clone()),
        SessionStore::with_ttl_secs(config.session.ttl_secs),
    ));

    // Drop renames nobody finished
    {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                let purged = router.sessions().purge_expired().await;
                if purged > 0 {
                    debug!(purged, "Purged expired sessions");
                }
            }
        });
    }

    let bot = Bot::new(config.bot.token.clone());

    info!("Bot initialized, starting dispatcher");

    Dispatcher::builder(bot, bot::schema())
        .dependencies(dptree::deps![router])
        // Updates are handled one at a time, in arrival order
        .distribution_function(|_| Some(()))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
