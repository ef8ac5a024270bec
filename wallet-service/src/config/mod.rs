use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed, is_production};
use service_core::error::AppError;
use std::env;

/// `WALLET_DATABASE_URL` value that selects the in-process store.
pub const IN_MEMORY_DATABASE_URL: &str = "in-memory";

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.url == IN_MEMORY_DATABASE_URL
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// Days after the bill date during which a reversal claws back everything.
    pub grace_window_days: i64,
    pub disbursement_interval_secs: u64,
    pub max_commit_attempts: u32,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            grace_window_days: 10,
            disbursement_interval_secs: 3600,
            max_commit_attempts: 3,
        }
    }
}

impl WalletConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let common = core_config::Config::load()?;
        let is_prod = is_production();

        let max_commit_attempts: u32 = get_env_parsed("WALLET_MAX_COMMIT_ATTEMPTS", "3", is_prod)?;
        if max_commit_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "WALLET_MAX_COMMIT_ATTEMPTS must be at least 1"
            )));
        }

        let disbursement_interval_secs: u64 =
            get_env_parsed("WALLET_DISBURSEMENT_INTERVAL_SECS", "3600", is_prod)?;
        if disbursement_interval_secs == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "WALLET_DISBURSEMENT_INTERVAL_SECS must be at least 1"
            )));
        }

        Ok(WalletConfig {
            common,
            service_name: get_env("WALLET_SERVICE_NAME", Some("wallet-service"), is_prod)?,
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            database: DatabaseConfig {
                url: get_env("WALLET_DATABASE_URL", Some(IN_MEMORY_DATABASE_URL), is_prod)?,
                max_connections: get_env_parsed("WALLET_DB_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: get_env_parsed("WALLET_DB_MIN_CONNECTIONS", "2", is_prod)?,
            },
            payments: PaymentsConfig {
                grace_window_days: get_env_parsed("WALLET_GRACE_WINDOW_DAYS", "10", is_prod)?,
                disbursement_interval_secs,
                max_commit_attempts,
            },
        })
    }
}
