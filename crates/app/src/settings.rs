//! Handles settings for the application. Configuration is read from a TOML
//! file (`config/ledgerly.toml` unless `--config` says otherwise) and from
//! `LEDGERLY__<SECTION>__<KEY>` environment variables, which win.
//!
//! See `config/ledgerly.toml` for an example.
use chrono::Duration;
use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config/ledgerly.toml";
/// One year.
const MAX_ACCESS_TTL_MINUTES: i64 = 525_600;
/// Ten years.
const MAX_REFRESH_TTL_DAYS: i64 = 3_650;

#[derive(Debug, Parser)]
#[command(name = "ledgerly", version)]
struct Args {
    /// Config file path (TOML).
    #[arg(long, env = "LEDGERLY_CONFIG")]
    config: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub port: u16,
    pub database: Database,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
            database: Database::Memory,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    /// Key signing the access and refresh tokens.
    pub secret: String,
    #[serde(default = "default_access_ttl_minutes")]
    pub access_ttl_minutes: i64,
    #[serde(default = "default_refresh_ttl_days")]
    pub refresh_ttl_days: i64,
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
}

impl Auth {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::Message("auth.secret must not be empty".to_string()));
        }
        if !(1..=MAX_ACCESS_TTL_MINUTES).contains(&self.access_ttl_minutes) {
            return Err(ConfigError::Message(format!(
                "auth.access_ttl_minutes must be between 1 and {MAX_ACCESS_TTL_MINUTES}"
            )));
        }
        if !(1..=MAX_REFRESH_TTL_DAYS).contains(&self.refresh_ttl_days) {
            return Err(ConfigError::Message(format!(
                "auth.refresh_ttl_days must be between 1 and {MAX_REFRESH_TTL_DAYS}"
            )));
        }
        Ok(())
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::minutes(self.access_ttl_minutes)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::days(self.refresh_ttl_days)
    }
}

fn default_access_ttl_minutes() -> i64 {
    60
}

fn default_refresh_ttl_days() -> i64 {
    7
}

fn default_password_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub server: Server,
    pub auth: Auth,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let args = Args::parse();
        let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);

        let settings = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix("LEDGERLY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = settings.try_deserialize()?;
        settings.auth.validate()?;
        Ok(settings)
    }
}
