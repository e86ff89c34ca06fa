//! Process configuration, read once at start-up.
//!
//! Every required value is checked before the bot connects to anything, so a
//! misconfigured process fails immediately with the offending key.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot: BotConfig,
    pub database: DatabaseConfig,
    pub import: ImportConfig,
    pub session: SessionConfig,
    pub log_format: LogFormat,
}

#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
}

// Keep the token out of logs
impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig").field("token", &"***").finish()
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Directory holding `regions.csv` and `districts.csv`
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a pending rename survives without a reply
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    reason: format!("expected 'text' or 'json', got '{other}'"),
                })
            }
        };

        Ok(Self {
            bot: BotConfig {
                token: required(&lookup, "TELEGRAM_BOT_TOKEN")?,
            },
            database: DatabaseConfig {
                user: required(&lookup, "POSTGRES_USER")?,
                password: required(&lookup, "POSTGRES_PASSWORD")?,
                host: required(&lookup, "POSTGRES_HOST")?,
                port: parsed(&lookup, "POSTGRES_PORT", None)?,
                database: required(&lookup, "POSTGRES_DATABASE")?,
                max_connections: parsed(
                    &lookup,
                    "DB_MAX_CONNECTIONS",
                    Some(DatabaseConfig::DEFAULT_MAX_CONNECTIONS),
                )?,
                acquire_timeout_secs: parsed(
                    &lookup,
                    "DB_ACQUIRE_TIMEOUT_SECS",
                    Some(DatabaseConfig::DEFAULT_ACQUIRE_TIMEOUT_SECS),
                )?,
            },
            import: ImportConfig {
                dir: lookup("IMPORT_DIR")
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
            },
            session: SessionConfig {
                ttl_secs: parsed(
                    &lookup,
                    "SESSION_TTL_SECS",
                    Some(SessionConfig::DEFAULT_TTL_SECS),
                )?,
            },
            log_format,
        })
    }
}

impl DatabaseConfig {
    // One shared connection, like a single long-lived session
    const DEFAULT_MAX_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

impl SessionConfig {
    const DEFAULT_TTL_SECS: u64 = 600;
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => default.ok_or(ConfigError::Missing(key)),
    }
}
