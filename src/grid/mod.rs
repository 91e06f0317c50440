//! Grid Trading Engine
//!
//! Two-sided grid market making on a perpetual-futures venue that offers no
//! order-update stream: every fill is discovered by polling.
//!
//! # Architecture
//!
//! - [`config`] - Per-instrument grid configuration, precision and static rules
//! - [`types`] - Core data types (OrderRecord, OrderStatus, OrderSnapshot, etc.)
//! - [`errors`] - Grid-specific error types
//! - [`price`] - Integer price-level keys and band arithmetic
//! - [`ledger`] - Per-side map from price level to order record
//! - [`executor`] - Exchange abstraction
//! - [`sim`] - In-memory venue for paper trading and tests
//! - [`sizer`] - Inventory and reserved take-profit size
//! - [`stats`] - Round-trip counters and daily report
//! - [`runner`] - Strategy loop and worker task
//!
//! The strategy loop itself is split over `sync` (order id discovery),
//! `reconcile` (fill detection) and `maintainer` (placement and pruning).
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use standx_grid::grid::{GridConfig, GridRunner, GridWorker, SimExchange};
//! use standx_grid::notify::LogNotifier;
//!
//! let config = GridConfig::new("ETH-USD", 0.1).with_sides(true, true);
//! let exchange = Arc::new(SimExchange::new("ETH-USD", 4000.0));
//! let runner = GridRunner::new(config, exchange, Arc::new(LogNotifier), "desk-1")?;
//!
//! let worker = GridWorker::spawn(runner);
//! // ...
//! let runner = worker.stop().await?;
//! println!("{}", runner.summary());
//! ```

pub mod config;
pub mod errors;
pub mod executor;
pub mod ledger;
mod maintainer;
pub mod price;
mod reconcile;
pub mod runner;
pub mod sim;
pub mod sizer;
pub mod stats;
mod sync;
pub mod types;

// Re-export commonly used types
pub use config::{AssetPrecision, GridConfig, InstrumentRules};
pub use errors::{GridError, GridResult};
pub use executor::GridExchange;
pub use ledger::GridLedger;
pub use price::{Bands, PriceKey};
pub use runner::{GridRunner, GridWorker, RunnerSummary};
pub use sim::{PaperExchange, SimExchange, SimExchangeInput};
pub use sizer::InventorySizer;
pub use stats::DailyStats;
pub use types::{
    Balance, BotStatus, OrderRecord, OrderRequest, OrderSide, OrderSnapshot, OrderStatus,
    OrderType, Position, PositionSide, Ticker, VenueStatus,
};
