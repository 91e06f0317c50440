//! Grid trading configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{GridError, GridResult};
use super::price::PriceKey;

/// Keeps `10^decimals` and every tick count well inside `i64`
const MAX_DECIMALS: u32 = 9;

/// Slack for intervals like 0.1 that are not exact in binary
const TICK_EPSILON: f64 = 1e-6;

/// Price and size precision for one instrument
///
/// Prices are tracked internally as integer ticks of `10^-price_decimals`,
/// so a price always maps to exactly one ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPrecision {
    /// Decimal places for price
    pub price_decimals: u32,
    /// Decimal places for size
    pub size_decimals: u32,
}

impl AssetPrecision {
    pub fn new(price_decimals: u32, size_decimals: u32) -> Self {
        Self {
            price_decimals,
            size_decimals,
        }
    }

    /// Number of ticks per unit of price
    pub fn scale(&self) -> f64 {
        10f64.powi(self.price_decimals as i32)
    }

    /// Nearest tick for a price
    pub fn key(&self, price: f64) -> PriceKey {
        PriceKey((price * self.scale()).round() as i64)
    }

    /// Tick at or below a price; tolerant to representation error just under a tick
    pub fn floor_key(&self, price: f64) -> PriceKey {
        PriceKey((price * self.scale() + 1e-6).floor() as i64)
    }

    /// Price of a tick
    pub fn price(&self, key: PriceKey) -> f64 {
        key.0 as f64 / self.scale()
    }

    /// Round a price to the tick grid
    pub fn round_price(&self, price: f64) -> f64 {
        self.price(self.key(price))
    }

    /// Format a price for the venue
    pub fn format_price(&self, price: f64) -> String {
        format!("{:.*}", self.price_decimals as usize, self.round_price(price))
    }

    /// Format a size for the venue
    pub fn format_size(&self, size: f64) -> String {
        format!("{:.*}", self.size_decimals as usize, size)
    }

    /// Whether two sizes are equal at size precision
    pub fn same_size(&self, a: f64, b: f64) -> bool {
        let scale = 10f64.powi(self.size_decimals as i32);
        (a * scale).round() as i64 == (b * scale).round() as i64
    }
}

impl Default for AssetPrecision {
    fn default() -> Self {
        Self::new(2, 4)
    }
}

/// Static per-instrument parameters used when the operator leaves them out
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentRules {
    /// Reference price of the starting band; `None` means "use the live price"
    pub base_price: Option<f64>,
    pub interval: f64,
}

impl InstrumentRules {
    pub const FALLBACK_INTERVAL: f64 = 0.1;

    /// Rules for a known instrument, or the fallback interval with no base price
    pub fn lookup(symbol: &str) -> Self {
        match symbol {
            "BTC-USD" => Self {
                base_price: Some(100_000.0),
                interval: 100.0,
            },
            "ETH-USD" => Self {
                base_price: Some(4_000.0),
                interval: 5.0,
            },
            "SOL-USD" => Self {
                base_price: Some(200.0),
                interval: 0.25,
            },
            _ => Self {
                base_price: None,
                interval: Self::FALLBACK_INTERVAL,
            },
        }
    }
}

/// Immutable configuration of one instrument's grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Instrument symbol (e.g. "ETH-USD")
    pub symbol: String,

    /// Size of every grid order
    pub grid_unit: f64,

    /// Price distance between adjacent grid levels
    pub interval: f64,

    /// Reference price for the starting band, if known before the first price fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_price: Option<f64>,

    pub precision: AssetPrecision,

    pub long_enabled: bool,
    pub short_enabled: bool,

    /// Number of entry levels kept on each side (N)
    pub window: u32,

    /// Number of take-profit levels placed beyond the window
    pub tp_levels: u32,

    /// Position cap as a multiple of `grid_unit * window`
    pub inventory_cap_multiple: f64,

    /// Snapshot polls when synchronizing a placed order's id
    pub sync_attempts: u32,
    pub sync_interval_ms: u64,

    /// Attempts to attach a take-profit to a filled entry
    pub tp_place_attempts: u32,

    /// Pause after a top-up market order
    pub top_up_settle_ms: u64,

    /// Pause after an aborted cycle or failed initialisation
    pub error_backoff_ms: u64,
}

impl GridConfig {
    /// Create a config using the static rules for `symbol`
    pub fn new(symbol: impl Into<String>, grid_unit: f64) -> Self {
        let symbol = symbol.into();
        let rules = InstrumentRules::lookup(&symbol);
        Self {
            symbol,
            grid_unit,
            interval: rules.interval,
            base_price: rules.base_price,
            precision: AssetPrecision::default(),
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

    /// Builder: set interval
    pub fn with_interval(mut self, interval: f64) -> Self {
        self.interval = interval;
        self
    }

    /// Builder: set starting band reference price
    pub fn with_base_price(mut self, price: f64) -> Self {
        self.base_price = Some(price);
        self
    }

    pub fn with_precision(mut self, precision: AssetPrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Builder: enable or disable each side
    pub fn with_sides(mut self, long: bool, short: bool) -> Self {
        self.long_enabled = long;
        self.short_enabled = short;
        self
    }

    /// Builder: set window and take-profit levels
    pub fn with_levels(mut self, window: u32, tp_levels: u32) -> Self {
        self.window = window;
        self.tp_levels = tp_levels;
        self
    }

    pub fn with_inventory_cap(mut self, multiple: f64) -> Self {
        self.inventory_cap_multiple = multiple;
        self
    }

    /// Builder: set id synchronisation polling
    pub fn with_sync(mut self, attempts: u32, interval_ms: u64) -> Self {
        self.sync_attempts = attempts;
        self.sync_interval_ms = interval_ms;
        self
    }

    pub fn with_tp_place_attempts(mut self, attempts: u32) -> Self {
        self.tp_place_attempts = attempts;
        self
    }

    /// Builder: set settle and backoff pauses
    pub fn with_pauses(mut self, top_up_settle_ms: u64, error_backoff_ms: u64) -> Self {
        self.top_up_settle_ms = top_up_settle_ms;
        self.error_backoff_ms = error_backoff_ms;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> GridResult<()> {
        if self.symbol.is_empty() {
            return Err(GridError::InvalidConfig("symbol cannot be empty".into()));
        }

        if !(self.grid_unit > 0.0) {
            return Err(GridError::InvalidConfig(format!(
                "{}: grid_unit must be positive",
                self.symbol
            )));
        }

        if !(self.interval > 0.0 && self.interval.is_finite()) {
            return Err(GridError::InvalidConfig(format!(
                "{}: interval must be positive",
                self.symbol
            )));
        }

        if self.precision.price_decimals > MAX_DECIMALS || self.precision.size_decimals > MAX_DECIMALS {
            return Err(GridError::InvalidConfig(format!(
                "{}: at most {} price and size decimals are supported",
                self.symbol, MAX_DECIMALS
            )));
        }

        if self.interval_ticks() < 1 {
            return Err(GridError::InvalidConfig(format!(
                "{}: interval {} is finer than price precision {}",
                self.symbol, self.interval, self.precision.price_decimals
            )));
        }

        let ticks = self.interval * self.precision.scale();
        if (ticks - ticks.round()).abs() > TICK_EPSILON {
            return Err(GridError::InvalidConfig(format!(
                "{}: interval {} is not a whole number of {}-decimal price ticks",
                self.symbol, self.interval, self.precision.price_decimals
            )));
        }

        if self.window == 0 {
            return Err(GridError::InvalidConfig(format!(
                "{}: window must be at least 1",
                self.symbol
            )));
        }

        if self.sync_attempts == 0 {
            return Err(GridError::InvalidConfig(format!(
                "{}: sync_attempts must be at least 1",
                self.symbol
            )));
        }

        if self.tp_place_attempts == 0 {
            return Err(GridError::InvalidConfig(format!(
                "{}: tp_place_attempts must be at least 1",
                self.symbol
            )));
        }

        if !self.long_enabled && !self.short_enabled {
            return Err(GridError::InvalidConfig(format!(
                "{}: at least one of long/short must be enabled",
                self.symbol
            )));
        }

        if self.inventory_cap_multiple < 0.0 {
            return Err(GridError::InvalidConfig(format!(
                "{}: inventory_cap_multiple cannot be negative",
                self.symbol
            )));
        }

        Ok(())
    }

    /// Interval expressed in price ticks
    pub fn interval_ticks(&self) -> i64 {
        (self.interval * self.precision.scale()).round() as i64
    }

    /// Size of one top-up and the base of the inventory cap
    pub fn window_size(&self) -> f64 {
        self.grid_unit * self.window as f64
    }

    /// Position beyond which no further top-up is issued
    pub fn inventory_cap(&self) -> f64 {
        self.window_size() * self.inventory_cap_multiple
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn top_up_settle(&self) -> Duration {
        Duration::from_millis(self.top_up_settle_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}
