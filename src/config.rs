use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
pub use config::ConfigError;
use serde::Deserialize;

use crate::grid::{AssetPrecision, GridConfig, GridError, GridResult};
use crate::standx::DEFAULT_API_BASE_URL;

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Venue access and trading mode
    #[serde(default)]
    pub network: NetworkConfig,
    /// Strategy parameters shared by every instrument
    #[serde(default)]
    pub grid: GridParams,
    /// One grid per entry
    pub instruments: Vec<InstrumentConfig>,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Simulated account used in paper mode
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Mode: "live" or "paper"
    pub mode: TradingMode,
    pub api_base_url: String,
    /// Pre-issued bearer token; in production load it from GRID__NETWORK__ACCESS_TOKEN
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token: None,
            request_timeout_secs: 10,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridParams {
    pub long_enabled: bool,
    pub short_enabled: bool,
    /// Entry levels kept resting per side
    pub window: u32,
    pub tp_levels: u32,
    /// Top-ups stop once a side holds this many windows of units
    pub inventory_cap_multiple: f64,
    pub sync_attempts: u32,
    pub sync_interval_ms: u64,
    pub tp_place_attempts: u32,
    pub top_up_settle_ms: u64,
    pub error_backoff_ms: u64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            long_enabled: true,
            short_enabled: false,
            window: 5,
            tp_levels: 5,
            inventory_cap_multiple: 3.0,
            sync_attempts: 5,
            sync_interval_ms: 1000,
            tp_place_attempts: 10,
            top_up_settle_ms: 1000,
            error_backoff_ms: 1000,
        }
    }
}

/// Per-instrument settings; omitted fields come from the built-in rules table
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    pub grid_unit: f64,
    pub interval: Option<f64>,
    pub base_price: Option<f64>,
    pub price_decimals: Option<u32>,
    pub size_decimals: Option<u32>,
}

impl InstrumentConfig {
    pub fn precision(&self) -> AssetPrecision {
        let default = AssetPrecision::default();
        AssetPrecision::new(
            self.price_decimals.unwrap_or(default.price_decimals),
            self.size_decimals.unwrap_or(default.size_decimals),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Label prefixed to every notification
    pub uid: String,
    /// Push server; notifications are only logged when absent
    pub bark_url: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            uid: "grid".to_string(),
            bark_url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub initial_balance: f64,
    pub initial_long: f64,
    pub initial_short: f64,
    /// Snapshot polls before a new simulated order becomes visible
    pub publish_delay: u32,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            initial_long: 0.0,
            initial_short: 0.0,
            publish_delay: 0,
        }
    }
}

impl Settings {
    /// Load settings from a configuration file
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        Self::build(File::with_name(config_path))
    }

    /// Load settings from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Self::build(File::from_str(text, FileFormat::Toml))
    }

    fn build<S>(file: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let s = Config::builder()
            .add_source(file)
            // Environment variables override the file,
            // e.g. GRID__NETWORK__ACCESS_TOKEN=...
            .add_source(Environment::with_prefix("GRID").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Validated engine configuration for every instrument
    pub fn grid_configs(&self) -> GridResult<Vec<GridConfig>> {
        if self.instruments.is_empty() {
            return Err(GridError::InvalidConfig("no instruments configured".into()));
        }

        let params = &self.grid;
        self.instruments
            .iter()
            .map(|instrument| -> GridResult<GridConfig> {
                let mut config = GridConfig::new(&instrument.symbol, instrument.grid_unit)
                    .with_precision(instrument.precision())
                    .with_sides(params.long_enabled, params.short_enabled)
                    .with_levels(params.window, params.tp_levels)
                    .with_inventory_cap(params.inventory_cap_multiple)
                    .with_sync(params.sync_attempts, params.sync_interval_ms)
                    .with_tp_place_attempts(params.tp_place_attempts)
                    .with_pauses(params.top_up_settle_ms, params.error_backoff_ms);
                if let Some(interval) = instrument.interval {
                    config = config.with_interval(interval);
                }
                if let Some(base_price) = instrument.base_price {
                    config = config.with_base_price(base_price);
                }
                config.validate()?;
                Ok(config)
            })
            .collect()
    }
}
