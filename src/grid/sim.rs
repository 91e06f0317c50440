//! In-memory venue simulation
//!
//! `SimExchange` keeps resting orders, positions and balance locally and
//! fills limit orders when the pushed price crosses them. It backs paper
//! trading (`PaperExchange`, live prices from a real feed) and every engine
//! test.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::Mutex;

use super::errors::{GridError, GridResult};
use super::executor::GridExchange;
use super::types::{
    Balance, OrderRequest, OrderSide, OrderSnapshot, OrderType, Position, PositionSide, Ticker,
    VenueStatus,
};

/// Input configuration for creating a SimExchange
#[derive(Debug, Clone)]
pub struct SimExchangeInput {
    pub initial_balance: f64,
    pub initial_long: f64,
    pub initial_short: f64,
    /// Snapshot polls a new resting order stays invisible for
    pub publish_delay: u32,
}

impl Default for SimExchangeInput {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            initial_long: 0.0,
            initial_short: 0.0,
            publish_delay: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct SimOrder {
    id: String,
    request: OrderRequest,
    price: f64,
    hidden_polls: u32,
}

impl SimOrder {
    fn crosses(&self, market: f64) -> bool {
        crosses(self.request.side, self.price, market)
    }

    fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id.clone(),
            side: self.request.side,
            position_side: self.request.position_side,
            price: self.price,
            size: self.request.size,
            reduce_only: self.request.reduce_only,
            status: VenueStatus::New,
        }
    }
}

/// Buy fills when the market is at or below the limit, sell at or above
fn crosses(side: OrderSide, limit: f64, market: f64) -> bool {
    match side {
        OrderSide::Buy => market <= limit,
        OrderSide::Sell => market >= limit,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SimPosition {
    amount: f64,
    entry_price: f64,
}

#[derive(Debug)]
struct SimState {
    price: f64,
    resting: Vec<SimOrder>,
    finished: HashMap<String, VenueStatus>,
    long: SimPosition,
    short: SimPosition,
    initial_balance: f64,
    realized_pnl: f64,
    publish_delay: u32,
    reject_remaining: u32,
    fail_reads: bool,
    status_overrides: HashMap<String, VenueStatus>,
    placed: Vec<OrderRequest>,
    cancelled: Vec<String>,
    status_queries: Vec<String>,
}

impl SimState {
    fn position_mut(&mut self, side: PositionSide) -> &mut SimPosition {
        match side {
            PositionSide::Long => &mut self.long,
            PositionSide::Short => &mut self.short,
        }
    }

    fn position(&self, side: PositionSide) -> SimPosition {
        match side {
            PositionSide::Long => self.long,
            PositionSide::Short => self.short,
        }
    }

    fn apply_fill(&mut self, request: &OrderRequest, price: f64) {
        let side = request.position_side;
        let pos = self.position_mut(side);
        if request.reduce_only {
            let qty = request.size.min(pos.amount);
            let pnl = match side {
                PositionSide::Long => (price - pos.entry_price) * qty,
                PositionSide::Short => (pos.entry_price - price) * qty,
            };
            pos.amount -= qty;
            if pos.amount <= 1e-12 {
                pos.amount = 0.0;
                pos.entry_price = 0.0;
            }
            self.realized_pnl += pnl;
        } else {
            let value = pos.entry_price * pos.amount + price * request.size;
            pos.amount += request.size;
            pos.entry_price = value / pos.amount;
        }
    }

    fn ensure_readable(&self) -> GridResult<()> {
        if self.fail_reads {
            return Err(GridError::Transport("simulated network failure".into()));
        }
        Ok(())
    }
}

/// In-memory venue
pub struct SimExchange {
    symbol: String,
    state: Arc<Mutex<SimState>>,
    next_id: AtomicU64,
}

impl SimExchange {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self::with_input(symbol, price, SimExchangeInput::default())
    }

    pub fn with_input(symbol: impl Into<String>, price: f64, input: SimExchangeInput) -> Self {
        let state = SimState {
            price,
            resting: Vec::new(),
            finished: HashMap::new(),
            long: SimPosition {
                amount: input.initial_long,
                entry_price: if input.initial_long > 0.0 { price } else { 0.0 },
            },
            short: SimPosition {
                amount: input.initial_short,
                entry_price: if input.initial_short > 0.0 { price } else { 0.0 },
            },
            initial_balance: input.initial_balance,
            realized_pnl: 0.0,
            publish_delay: input.publish_delay,
            reject_remaining: 0,
            fail_reads: false,
            status_overrides: HashMap::new(),
            placed: Vec::new(),
            cancelled: Vec::new(),
            status_queries: Vec::new(),
        };
        Self {
            symbol: symbol.into(),
            state: Arc::new(Mutex::new(state)),
            next_id: AtomicU64::new(1),
        }
    }

    fn new_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Move the market and fill every resting order it crosses
    pub async fn set_price(&self, price: f64) {
        let mut state = self.state.lock().await;
        state.price = price;

        let (filled, resting): (Vec<_>, Vec<_>) =
            state.resting.drain(..).partition(|o| o.crosses(price));
        state.resting = resting;

        for order in filled {
            debug!("[{}] sim fill {} {} @ {}", self.symbol, order.id, order.request.side.as_str(), order.price);
            state.apply_fill(&order.request, order.price);
            state.finished.insert(order.id, VenueStatus::Filled);
        }
    }

    pub async fn set_position(&self, side: PositionSide, amount: f64) {
        let mut state = self.state.lock().await;
        let price = state.price;
        let pos = state.position_mut(side);
        pos.amount = amount;
        pos.entry_price = price;
    }

    pub async fn position_amount(&self, side: PositionSide) -> f64 {
        self.state.lock().await.position(side).amount
    }

    pub async fn set_publish_delay(&self, polls: u32) {
        self.state.lock().await.publish_delay = polls;
    }

    /// Reject the next `count` placements
    pub async fn reject_next_places(&self, count: u32) {
        self.state.lock().await.reject_remaining = count;
    }

    /// Make every query fail as a transport error
    pub async fn set_fail_reads(&self, fail: bool) {
        self.state.lock().await.fail_reads = fail;
    }

    /// Force the status reported for an order id
    pub async fn set_status_override(&self, order_id: &str, status: VenueStatus) {
        self.state
            .lock()
            .await
            .status_overrides
            .insert(order_id.to_string(), status);
    }

    /// Put an order straight on the book, visible immediately
    pub async fn insert_resting(&self, request: OrderRequest) -> String {
        let id = self.new_id();
        let price = request.price.unwrap_or_default();
        self.state.lock().await.resting.push(SimOrder {
            id: id.clone(),
            request,
            price,
            hidden_polls: 0,
        });
        id
    }

    /// Every accepted or rejected placement, in order
    pub async fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().await.placed.clone()
    }

    pub async fn cancelled_ids(&self) -> Vec<String> {
        self.state.lock().await.cancelled.clone()
    }

    /// Order ids passed to status queries, in order
    pub async fn status_queries(&self) -> Vec<String> {
        self.state.lock().await.status_queries.clone()
    }

    /// Resting orders including unpublished ones, without consuming a poll
    pub async fn resting_orders(&self) -> Vec<OrderSnapshot> {
        self.state
            .lock()
            .await
            .resting
            .iter()
            .map(SimOrder::snapshot)
            .collect()
    }
}

#[async_trait]
impl GridExchange for SimExchange {
    async fn get_price(&self, _symbol: &str) -> GridResult<Ticker> {
        let state = self.state.lock().await;
        state.ensure_readable()?;
        Ok(Ticker {
            contract: self.symbol.clone(),
            last: state.price,
        })
    }

    async fn get_positions(&self, _symbol: &str) -> GridResult<Vec<Position>> {
        let state = self.state.lock().await;
        state.ensure_readable()?;
        Ok([PositionSide::Long, PositionSide::Short]
            .into_iter()
            .filter(|side| state.position(*side).amount > 0.0)
            .map(|side| Position {
                position_side: side,
                position_amt: state.position(side).amount,
            })
            .collect())
    }

    async fn get_open_orders(&self, _symbol: &str) -> GridResult<Vec<OrderSnapshot>> {
        let mut state = self.state.lock().await;
        state.ensure_readable()?;

        let mut visible = Vec::new();
        for order in state.resting.iter_mut() {
            if order.hidden_polls == 0 {
                visible.push(order.snapshot());
            } else {
                order.hidden_polls -= 1;
            }
        }
        Ok(visible)
    }

    async fn get_order_status(&self, _symbol: &str, order_id: &str) -> GridResult<VenueStatus> {
        let mut state = self.state.lock().await;
        state.status_queries.push(order_id.to_string());
        state.ensure_readable()?;

        if let Some(status) = state.status_overrides.get(order_id) {
            return Ok(status.clone());
        }
        if state.resting.iter().any(|o| o.id == order_id) {
            return Ok(VenueStatus::New);
        }
        state
            .finished
            .get(order_id)
            .cloned()
            .ok_or_else(|| GridError::Rejected(format!("order {} not found", order_id)))
    }

    async fn place_order(&self, _symbol: &str, order: &OrderRequest) -> GridResult<()> {
        let id = self.new_id();
        let mut state = self.state.lock().await;
        state.placed.push(order.clone());

        if state.reject_remaining > 0 {
            state.reject_remaining -= 1;
            return Err(GridError::Rejected("simulated rejection".into()));
        }

        if order.reduce_only && state.position(order.position_side).amount + 1e-12 < order.size {
            return Err(GridError::Rejected("reduce-only order exceeds position".into()));
        }

        let market = state.price;
        match order.order_type {
            OrderType::Market => {
                state.apply_fill(order, market);
                state.finished.insert(id.clone(), VenueStatus::Filled);
                info!("[{}] sim market {} {} @ {}", self.symbol, order.side.as_str(), order.size, market);
            }
            OrderType::Limit => {
                let price = order
                    .price
                    .ok_or_else(|| GridError::Rejected("limit order without price".into()))?;
                if crosses(order.side, price, market) {
                    state.apply_fill(order, price);
                    state.finished.insert(id.clone(), VenueStatus::Filled);
                    debug!("[{}] sim limit {} filled on arrival @ {}", self.symbol, id, price);
                } else {
                    let hidden_polls = state.publish_delay;
                    state.resting.push(SimOrder {
                        id,
                        request: order.clone(),
                        price,
                        hidden_polls,
                    });
                }
            }
        }
        Ok(())
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> GridResult<()> {
        let mut state = self.state.lock().await;
        state.cancelled.push(order_id.to_string());

        let Some(pos) = state.resting.iter().position(|o| o.id == order_id) else {
            return Err(GridError::Rejected(format!("order {} not open", order_id)));
        };
        state.resting.remove(pos);
        state
            .finished
            .insert(order_id.to_string(), VenueStatus::Canceled);
        Ok(())
    }

    async fn get_balance(&self) -> GridResult<Balance> {
        let state = self.state.lock().await;
        state.ensure_readable()?;
        let total = state.initial_balance + state.realized_pnl;
        Ok(Balance {
            available: total,
            total,
        })
    }
}

/// Paper trading venue: live prices from `feed`, execution simulated locally
pub struct PaperExchange {
    feed: Arc<dyn GridExchange>,
    sim: SimExchange,
}

impl PaperExchange {
    pub fn new(feed: Arc<dyn GridExchange>, sim: SimExchange) -> Self {
        Self { feed, sim }
    }

    pub fn sim(&self) -> &SimExchange {
        &self.sim
    }
}

#[async_trait]
impl GridExchange for PaperExchange {
    async fn get_price(&self, symbol: &str) -> GridResult<Ticker> {
        let ticker = self.feed.get_price(symbol).await?;
        self.sim.set_price(ticker.last).await;
        Ok(ticker)
    }

    async fn get_positions(&self, symbol: &str) -> GridResult<Vec<Position>> {
        self.sim.get_positions(symbol).await
    }

    async fn get_open_orders(&self, symbol: &str) -> GridResult<Vec<OrderSnapshot>> {
        self.sim.get_open_orders(symbol).await
    }

    async fn get_order_status(&self, symbol: &str, order_id: &str) -> GridResult<VenueStatus> {
        self.sim.get_order_status(symbol, order_id).await
    }

    async fn place_order(&self, symbol: &str, order: &OrderRequest) -> GridResult<()> {
        self.sim.place_order(symbol, order).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> GridResult<()> {
        self.sim.cancel_order(symbol, order_id).await
    }

    async fn get_balance(&self) -> GridResult<Balance> {
        self.sim.get_balance().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_fills_when_price_crosses() {
        let sim = SimExchange::new("ETH-USD", 4000.0);
        sim.place_order("ETH-USD", &OrderRequest::limit_entry(PositionSide::Long, 3995.0, 0.1))
            .await
            .unwrap();
        assert_eq!(sim.get_open_orders("ETH-USD").await.unwrap().len(), 1);

        sim.set_price(3994.0).await;
        assert!(sim.get_open_orders("ETH-USD").await.unwrap().is_empty());
        assert!((sim.position_amount(PositionSide::Long).await - 0.1).abs() < 1e-12);
        assert_eq!(
            sim.get_order_status("ETH-USD", "1").await.unwrap(),
            VenueStatus::Filled
        );
    }

    #[tokio::test]
    async fn test_publish_delay_hides_new_orders() {
        let sim = SimExchange::new("ETH-USD", 4000.0);
        sim.set_publish_delay(2).await;
        sim.place_order("ETH-USD", &OrderRequest::limit_entry(PositionSide::Long, 3990.0, 0.1))
            .await
            .unwrap();
        assert!(sim.get_open_orders("ETH-USD").await.unwrap().is_empty());
        assert!(sim.get_open_orders("ETH-USD").await.unwrap().is_empty());
        assert_eq!(sim.get_open_orders("ETH-USD").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reduce_only_needs_position() {
        let sim = SimExchange::new("ETH-USD", 4000.0);
        let tp = OrderRequest::take_profit(PositionSide::Long, 4010.0, 0.1);
        assert!(matches!(
            sim.place_order("ETH-USD", &tp).await,
            Err(GridError::Rejected(_))
        ));

        sim.place_order("ETH-USD", &OrderRequest::market_entry(PositionSide::Long, 0.1))
            .await
            .unwrap();
        sim.place_order("ETH-USD", &tp).await.unwrap();
        sim.set_price(4010.0).await;
        assert_eq!(sim.position_amount(PositionSide::Long).await, 0.0);
        let balance = sim.get_balance().await.unwrap();
        assert!((balance.total - 10_001.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_cancel_and_status() {
        let sim = SimExchange::new("ETH-USD", 4000.0);
        let id = sim
            .insert_resting(OrderRequest::limit_entry(PositionSide::Short, 4010.0, 0.1))
            .await;
        sim.cancel_order("ETH-USD", &id).await.unwrap();
        assert_eq!(
            sim.get_order_status("ETH-USD", &id).await.unwrap(),
            VenueStatus::Canceled
        );
        assert!(sim.cancel_order("ETH-USD", &id).await.is_err());
        assert!(sim.get_order_status("ETH-USD", "999").await.is_err());
    }

    #[tokio::test]
    async fn test_paper_exchange_pulls_feed_price() {
        let feed = Arc::new(SimExchange::new("ETH-USD", 3900.0));
        let paper = PaperExchange::new(feed.clone(), SimExchange::new("ETH-USD", 4000.0));
        paper
            .place_order("ETH-USD", &OrderRequest::limit_entry(PositionSide::Long, 3950.0, 0.1))
            .await
            .unwrap();
        let ticker = paper.get_price("ETH-USD").await.unwrap();
        assert_eq!(ticker.last, 3900.0);
        assert!(paper.get_open_orders("ETH-USD").await.unwrap().is_empty());
        assert!((paper.sim().position_amount(PositionSide::Long).await - 0.1).abs() < 1e-12);
    }
}
