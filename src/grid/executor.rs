//! Exchange abstraction for grid trading - enables simulation and tests

use async_trait::async_trait;

use super::errors::GridResult;
use super::types::{Balance, OrderRequest, OrderSnapshot, Position, Ticker, VenueStatus};

/// Venue operations the grid engine depends on
///
/// Placement returns no order id: ids are learned by polling the open-order
/// list. Every call either succeeds or fails; callers decide whether to retry.
#[async_trait]
pub trait GridExchange: Send + Sync {
    /// Last traded price
    async fn get_price(&self, symbol: &str) -> GridResult<Ticker>;

    /// Positions for the instrument, one per non-empty side
    async fn get_positions(&self, symbol: &str) -> GridResult<Vec<Position>>;

    /// Currently resting orders for the instrument
    async fn get_open_orders(&self, symbol: &str) -> GridResult<Vec<OrderSnapshot>>;

    /// Status of a single order
    async fn get_order_status(&self, symbol: &str, order_id: &str) -> GridResult<VenueStatus>;

    /// Submit an order
    async fn place_order(&self, symbol: &str, order: &OrderRequest) -> GridResult<()>;

    /// Cancel an order; callers treat failure as best-effort
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> GridResult<()>;

    /// Account balance (available, total)
    async fn get_balance(&self) -> GridResult<Balance>;
}
