use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::time::Duration;

use crate::daemon::MonitorSettings;
use crate::db::models::{STATUS_ACTIVE, STATUS_INACTIVE};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub blockchains: Vec<BlockchainSeed>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

// ============================================================
// Daemon Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// `count` passed to `listtransactions` each cycle.
    #[serde(default = "default_transaction_batch")]
    pub transaction_batch: u32,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Start every daemon at boot. Otherwise they start on the first
    /// `GET /api/daemon`.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 60_000,
            transaction_batch: 100,
            rpc_timeout_secs: 30,
            autostart: true,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    60_000
}

fn default_transaction_batch() -> u32 {
    100
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl DaemonConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            transaction_batch: self.transaction_batch,
            rpc_timeout: Duration::from_secs(self.rpc_timeout_secs),
        }
    }
}

// ============================================================
// API Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

fn default_api_port() -> u16 {
    3000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

// ============================================================
// Logging Config
// ============================================================

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

// ============================================================
// Blockchain / Currency Seeds
// ============================================================

/// A `blockchains` row upserted at startup, keyed by name.
#[derive(Debug, Deserialize, Clone)]
pub struct BlockchainSeed {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub wallet_name: Option<String>,
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u32,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub currencies: Vec<CurrencySeed>,
}

fn default_min_confirmations() -> u32 {
    1
}

fn default_status() -> String {
    STATUS_ACTIVE.to_string()
}

/// A `currencies` row bound to the enclosing blockchain, keyed by symbol.
#[derive(Debug, Deserialize, Clone)]
pub struct CurrencySeed {
    pub symbol: String,
    pub name: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default)]
    pub deposit_fee: BigDecimal,
    #[serde(default)]
    pub min_deposit: BigDecimal,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_decimals() -> u8 {
    8
}

fn is_valid_status(status: &str) -> bool {
    status == STATUS_ACTIVE || status == STATUS_INACTIVE
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config
            .validate()
            .map_err(|e| eyre::eyre!("Invalid config file '{}': {}", path, e))?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(eyre::eyre!("database.url must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(eyre::eyre!("database.max_connections must be greater than 0"));
        }
        if self.daemon.poll_interval_ms == 0 {
            return Err(eyre::eyre!("daemon.poll_interval_ms must be greater than 0"));
        }
        if !(1..=1000).contains(&self.daemon.transaction_batch) {
            return Err(eyre::eyre!(
                "daemon.transaction_batch must be between 1 and 1000, got {}",
                self.daemon.transaction_batch
            ));
        }
        if self.daemon.rpc_timeout_secs == 0 {
            return Err(eyre::eyre!("daemon.rpc_timeout_secs must be greater than 0"));
        }

        for chain in &self.blockchains {
            if chain.name.trim().is_empty() {
                return Err(eyre::eyre!("Blockchain seed with an empty name"));
            }
            if chain.host.trim().is_empty() || chain.port == 0 {
                return Err(eyre::eyre!(
                    "Blockchain '{}' must have a host and a non-zero port",
                    chain.name
                ));
            }
            if !is_valid_status(&chain.status) {
                return Err(eyre::eyre!(
                    "Blockchain '{}' has invalid status '{}'",
                    chain.name,
                    chain.status
                ));
            }
            for currency in &chain.currencies {
                if currency.symbol.trim().is_empty() {
                    return Err(eyre::eyre!(
                        "Currency with an empty symbol on blockchain '{}'",
                        chain.name
                    ));
                }
                if !is_valid_status(&currency.status) {
                    return Err(eyre::eyre!(
                        "Currency '{}' has invalid status '{}'",
                        currency.symbol,
                        currency.status
                    ));
                }
                if currency.deposit_fee < BigDecimal::from(0)
                    || currency.min_deposit < BigDecimal::from(0)
                {
                    return Err(eyre::eyre!(
                        "Currency '{}' must not have a negative fee or minimum deposit",
                        currency.symbol
                    ));
                }
            }
        }
        Ok(())
    }
}
