use crate::error::{ExchangeError, Result};
use crate::model::RateTuple;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub builder: BuilderConfig,
    pub reservation: ReservationConfig,
    pub quotation: QuotationConfig,
    pub counterparty: CounterpartyConfig,
    pub rates: Vec<RateEntry>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout_seconds: u64,
}

/// External raw-transaction template builder.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub path: String,
    pub option: String,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct ReservationConfig {
    pub lock_duration_seconds: u64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct QuotationConfig {
    pub ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct CounterpartyConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

/// One row of the exchanger's fixed rate table: how many `request` units
/// one `offer` unit buys.
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct RateEntry {
    pub offer: String,
    pub request: String,
    pub rate: f64,
    pub min: i64,
    pub max: i64,
    #[serde(default)]
    pub unit: i64,
    pub fee: i64,
}

impl RateEntry {
    pub fn tuple(&self) -> RateTuple {
        RateTuple {
            rate: self.rate,
            min: self.min,
            max: self.max,
            unit: self.unit,
            fee: self.fee,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            ledger: LedgerConfig::default(),
            builder: BuilderConfig::default(),
            reservation: ReservationConfig::default(),
            quotation: QuotationConfig::default(),
            counterparty: CounterpartyConfig::default(),
            rates: vec![RateEntry::default()],
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:10000".to_string(),
            user: "user".to_string(),
            password: "pass".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            path: "elements-tx".to_string(),
            option: String::new(),
        }
    }
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            lock_duration_seconds: 600,
            sweep_interval_seconds: 3,
        }
    }
}

impl Default for QuotationConfig {
    fn default() -> Self {
        Self { ttl_seconds: 600 }
    }
}

impl Default for CounterpartyConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8020".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for RateEntry {
    fn default() -> Self {
        let tuple = RateTuple::default();
        Self {
            offer: "AKISKY".to_string(),
            request: "MELON".to_string(),
            rate: tuple.rate,
            min: tuple.min,
            max: tuple.max,
            unit: tuple.unit,
            fee: tuple.fee,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "human".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults for the exchanger process: its own listen port and ledger node.
    pub fn exchanger_default() -> Self {
        let mut config = Self::default();
        config.server.port = 8020;
        config.ledger.url = "http://127.0.0.1:10020".to_string();
        config
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| ExchangeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AppConfig = toml::from_str(&config_str)
            .map_err(|e| ExchangeError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Layers `ASSETX__<SECTION>__<KEY>` environment variables over the file.
    pub fn load_with_env_overrides<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("ASSETX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let mut config: AppConfig = settings.try_deserialize()?;

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            config.logging.level = log_level;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ExchangeError::Config("Server port cannot be 0".to_string()));
        }

        if self.ledger.url.is_empty() {
            return Err(ExchangeError::Config("Ledger URL cannot be empty".to_string()));
        }

        if self.builder.path.is_empty() {
            return Err(ExchangeError::Config(
                "Template builder path cannot be empty".to_string(),
            ));
        }

        if self.reservation.lock_duration_seconds == 0 || self.reservation.sweep_interval_seconds == 0 {
            return Err(ExchangeError::Config(
                "Reservation durations must be positive".to_string(),
            ));
        }

        if self.quotation.ttl_seconds == 0 {
            return Err(ExchangeError::Config("Quotation TTL must be positive".to_string()));
        }

        if self.counterparty.base_url.is_empty() {
            return Err(ExchangeError::Config(
                "Counterparty base URL cannot be empty".to_string(),
            ));
        }

        for entry in &self.rates {
            if !(entry.rate > 0.0) {
                return Err(ExchangeError::Config(format!(
                    "Rate {} -> {} must be positive",
                    entry.offer, entry.request
                )));
            }
            if entry.min > entry.max {
                return Err(ExchangeError::Config(format!(
                    "Rate {} -> {} has min {} above max {}",
                    entry.offer, entry.request, entry.min, entry.max
                )));
            }
        }

        Ok(())
    }

    pub fn get_server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::from_secs(self.reservation.lock_duration_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.reservation.sweep_interval_seconds)
    }

    pub fn quotation_ttl(&self) -> Duration {
        Duration::from_secs(self.quotation.ttl_seconds)
    }
}

pub fn write_config_file<P: AsRef<Path>>(path: P, config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ExchangeError::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, toml_str)
        .map_err(|e| ExchangeError::Config(format!("Failed to write config file: {}", e)))?;

    Ok(())
}
