//! Grid runner - per-instrument strategy loop and its worker task

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::notify::Notifier;

use super::config::GridConfig;
use super::errors::{GridError, GridResult};
use super::executor::GridExchange;
use super::ledger::GridLedger;
use super::price::{Bands, PriceKey};
use super::sizer::InventorySizer;
use super::stats::DailyStats;
use super::types::{BotStatus, OrderSnapshot, PositionSide};

/// Owns one instrument's grid: ledger, inventory, counters and bands
///
/// Every field is mutated only by this runner, so nothing is locked.
pub struct GridRunner {
    pub(super) config: GridConfig,
    pub(super) exchange: Arc<dyn GridExchange>,
    notifier: Arc<dyn Notifier>,
    uid: String,
    pub(super) ledger: GridLedger,
    /// Open orders as of the last refresh, minus anything cancelled since
    pub(super) open_orders: Vec<OrderSnapshot>,
    pub(super) last_price: f64,
    pub(super) market: PriceKey,
    pub(super) bands: Bands,
    pub(super) sizer: InventorySizer,
    pub(super) stats: DailyStats,
    status: BotStatus,
}

impl GridRunner {
    pub fn new(
        config: GridConfig,
        exchange: Arc<dyn GridExchange>,
        notifier: Arc<dyn Notifier>,
        uid: impl Into<String>,
    ) -> GridResult<Self> {
        config.validate()?;
        let base_price = config.base_price.unwrap_or_default();
        let bands = Bands::from_price(base_price, &config);
        let market = config.precision.key(base_price);

        Ok(Self {
            config,
            exchange,
            notifier,
            uid: uid.into(),
            ledger: GridLedger::new(),
            open_orders: Vec::new(),
            last_price: base_price,
            market,
            bands,
            sizer: InventorySizer::new(),
            stats: DailyStats::new(Local::now().date_naive()),
            status: BotStatus::Initializing,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn status(&self) -> BotStatus {
        self.status
    }

    pub fn ledger(&self) -> &GridLedger {
        &self.ledger
    }

    pub fn stats(&self) -> &DailyStats {
        &self.stats
    }

    pub fn sizer(&self) -> &InventorySizer {
        &self.sizer
    }

    pub fn bands(&self) -> &Bands {
        &self.bands
    }

    fn enabled_sides(&self) -> Vec<PositionSide> {
        let mut sides = Vec::with_capacity(2);
        if self.config.long_enabled {
            sides.push(PositionSide::Long);
        }
        if self.config.short_enabled {
            sides.push(PositionSide::Short);
        }
        sides
    }

    /// Fetch starting state and rebuild the ledger from resting orders
    pub async fn initialize(&mut self) -> GridResult<()> {
        self.status = BotStatus::Initializing;
        self.refresh_positions().await?;
        self.refresh_price().await?;
        self.refresh_open_orders().await?;

        for side in self.enabled_sides() {
            let seeded = self.ledger.seed(side, &self.open_orders, &self.config);
            info!("[{}] {} {} levels seeded from open orders", self.config.symbol, seeded, side);
        }

        self.status = BotStatus::Running;
        info!(
            "[{}] Grid running: interval {}, unit {}, window {}, long {}, short {}",
            self.config.symbol,
            self.config.interval,
            self.config.grid_unit,
            self.config.window,
            self.config.long_enabled,
            self.config.short_enabled
        );
        Ok(())
    }

    /// One reconciliation and maintenance pass over every enabled side
    ///
    /// A failed price, position or open-order refresh aborts the cycle.
    pub async fn run_cycle(&mut self) -> GridResult<()> {
        self.report_daily().await;
        self.refresh_price().await?;
        self.refresh_positions().await?;
        self.refresh_open_orders().await?;

        for side in self.enabled_sides() {
            self.run_side(side).await;
        }
        Ok(())
    }

    async fn run_side(&mut self, side: PositionSide) {
        self.prune_out_of_band(side).await;
        self.sizer.count_reserved(side, &self.open_orders);
        self.check_filled_entries(side).await;
        self.check_filled_take_profits(side).await;
        self.place_entries(side).await;
        self.place_take_profits(side).await;
    }

    pub(super) async fn refresh_price(&mut self) -> GridResult<()> {
        let ticker = self
            .exchange
            .get_price(&self.config.symbol)
            .await
            .map_err(|e| {
                error!("[{}] Failed to get current price: {}", self.config.symbol, e);
                e
            })?;

        self.last_price = ticker.last;
        self.market = self.config.precision.key(ticker.last);
        self.bands = Bands::from_price(ticker.last, &self.config);
        debug!(
            "[{}] Current price {} band {} / {}",
            self.config.symbol,
            ticker.last,
            self.config.precision.price(self.bands.fix_long),
            self.config.precision.price(self.bands.fix_short)
        );
        Ok(())
    }

    pub(super) async fn refresh_positions(&mut self) -> GridResult<()> {
        let positions = self
            .exchange
            .get_positions(&self.config.symbol)
            .await
            .map_err(|e| {
                error!("[{}] Failed to get positions: {}", self.config.symbol, e);
                e
            })?;
        self.sizer.update_positions(&positions);
        Ok(())
    }

    pub(super) async fn refresh_open_orders(&mut self) -> GridResult<()> {
        self.open_orders = self
            .exchange
            .get_open_orders(&self.config.symbol)
            .await
            .map_err(|e| {
                error!("[{}] Failed to get open orders: {}", self.config.symbol, e);
                e
            })?;
        Ok(())
    }

    /// Send the daily report once the local date has changed
    pub async fn report_daily(&mut self) {
        self.report_daily_at(Local::now().date_naive()).await;
    }

    /// Daily report against an explicit date; a failed balance query postpones it
    pub async fn report_daily_at(&mut self, today: NaiveDate) {
        if !self.stats.rollover_due(today) {
            return;
        }

        let balance = match self.exchange.get_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("[{}] Daily report postponed, balance query failed: {}", self.config.symbol, e);
                return;
            }
        };

        let message = self.stats.report(&self.uid, &self.config.symbol, &balance);
        info!("[{}] {}", self.config.symbol, message);
        self.notifier.notify(&message).await;
        self.stats.roll(today);
    }

    pub(super) fn mark_stopped(&mut self) {
        self.status = BotStatus::Stopped;
    }

    pub fn summary(&self) -> RunnerSummary {
        let precision = self.config.precision;
        RunnerSummary {
            symbol: self.config.symbol.clone(),
            status: self.status,
            last_price: self.last_price,
            fix_long: precision.price(self.bands.fix_long),
            fix_short: precision.price(self.bands.fix_short),
            long_position: self.sizer.position(PositionSide::Long),
            short_position: self.sizer.position(PositionSide::Short),
            long_reserved: self.sizer.reserved(PositionSide::Long),
            short_reserved: self.sizer.reserved(PositionSide::Short),
            long_levels: self.ledger.occupied(PositionSide::Long),
            short_levels: self.ledger.occupied(PositionSide::Short),
            total_trades: self.stats.total_trades,
            daily_trades: self.stats.daily_trades,
        }
    }
}

/// Point-in-time view of a runner, for logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerSummary {
    pub symbol: String,
    pub status: BotStatus,
    pub last_price: f64,
    pub fix_long: f64,
    pub fix_short: f64,
    pub long_position: f64,
    pub short_position: f64,
    pub long_reserved: f64,
    pub short_reserved: f64,
    /// Non-idle ledger levels
    pub long_levels: usize,
    pub short_levels: usize,
    pub total_trades: u64,
    pub daily_trades: u64,
}

impl fmt::Display for RunnerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} price={} band={}/{} long={}(tp {}) short={}(tp {}) levels={}/{} trades={} today={}",
            self.symbol,
            self.status,
            self.last_price,
            self.fix_long,
            self.fix_short,
            self.long_position,
            self.long_reserved,
            self.short_position,
            self.short_reserved,
            self.long_levels,
            self.short_levels,
            self.total_trades,
            self.daily_trades
        )
    }
}

/// A runner driven on its own tokio task
pub struct GridWorker {
    symbol: String,
    stop_tx: watch::Sender<bool>,
    summary_rx: watch::Receiver<RunnerSummary>,
    handle: JoinHandle<GridRunner>,
}

impl GridWorker {
    pub fn spawn(runner: GridRunner) -> Self {
        let symbol = runner.symbol().to_string();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (summary_tx, summary_rx) = watch::channel(runner.summary());
        let handle = tokio::spawn(run_worker(runner, stop_rx, summary_tx));
        Self {
            symbol,
            stop_tx,
            summary_rx,
            handle,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Summary published after the latest cycle
    pub fn summary(&self) -> RunnerSummary {
        self.summary_rx.borrow().clone()
    }

    /// Signal the loop to stop and wait for it; resting orders are left alone
    pub async fn stop(self) -> GridResult<GridRunner> {
        let _ = self.stop_tx.send(true);
        self.handle
            .await
            .map_err(|e| GridError::Inconsistent(format!("{} worker task failed: {}", self.symbol, e)))
    }
}

/// Sleep for `duration` unless a stop is signalled first
async fn pause(stop_rx: &mut watch::Receiver<bool>, duration: Duration) {
    if duration.is_zero() {
        tokio::task::yield_now().await;
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = stop_rx.changed() => {}
    }
}

async fn run_worker(
    mut runner: GridRunner,
    mut stop_rx: watch::Receiver<bool>,
    summary_tx: watch::Sender<RunnerSummary>,
) -> GridRunner {
    let symbol = runner.symbol().to_string();
    let backoff = runner.config().error_backoff();
    info!("[{}] Strategy worker started", symbol);

    let mut initialized = false;
    while !*stop_rx.borrow() {
        match runner.initialize().await {
            Ok(()) => {
                initialized = true;
                break;
            }
            Err(e) => {
                error!("[{}] Initialization failed, retrying: {}", symbol, e);
                pause(&mut stop_rx, backoff).await;
            }
        }
    }
    let _ = summary_tx.send(runner.summary());

    if initialized {
        while !*stop_rx.borrow() {
            match runner.run_cycle().await {
                Ok(()) => tokio::task::yield_now().await,
                Err(e) if e.is_transient() => {
                    warn!("[{}] Cycle aborted: {}", symbol, e);
                    pause(&mut stop_rx, backoff).await;
                }
                Err(e) => {
                    error!("[{}] Cycle failed: {}", symbol, e);
                    pause(&mut stop_rx, backoff).await;
                }
            }
            let _ = summary_tx.send(runner.summary());
        }
    }

    runner.mark_stopped();
    let _ = summary_tx.send(runner.summary());
    info!("[{}] Strategy worker stopped: {}", symbol, runner.summary());
    runner
}


#[cfg(test)]
mod tests {
    use super::test_support::{eth_config, runner};
    use super::*;
    use crate::grid::sim::SimExchange;
    use crate::grid::types::{OrderRequest, OrderStatus, OrderType};

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        let result = GridRunner::new(
            eth_config().with_levels(0, 3),
            sim,
            Arc::new(crate::notify::LogNotifier),
            "u1",
        );
        assert!(matches!(result, Err(GridError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_initialize_seeds_ledger() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        sim.set_position(PositionSide::Long, 0.1).await;
        let entry = sim
            .insert_resting(OrderRequest::limit_entry(PositionSide::Long, 3990.0, 0.1))
            .await;
        let tp = sim
            .insert_resting(OrderRequest::take_profit(PositionSide::Long, 4010.0, 0.1))
            .await;

        let (mut runner, _) = runner(eth_config(), &sim);
        runner.initialize().await.unwrap();
        assert_eq!(runner.status(), BotStatus::Running);

        let p = runner.config().precision;
        let seeded = runner.ledger().get(PositionSide::Long, p.key(3990.0)).unwrap();
        assert_eq!(seeded.id.as_deref(), Some(entry.as_str()));
        let seeded_tp = runner.ledger().get(PositionSide::Long, p.key(4005.0)).unwrap();
        assert_eq!(seeded_tp.tp_id.as_deref(), Some(tp.as_str()));
        assert_eq!(seeded_tp.status, OrderStatus::FilledCloseWait);
        assert_eq!(runner.sizer().position(PositionSide::Long), 0.1);
    }

    #[tokio::test]
    async fn test_cycle_aborts_on_transport_failure() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        let (mut runner, _) = runner(eth_config(), &sim);
        runner.initialize().await.unwrap();

        sim.set_fail_reads(true).await;
        let err = runner.run_cycle().await.unwrap_err();
        assert!(err.is_transient());
        assert!(sim.placed_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_first_cycle_builds_ladder() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        let (mut runner, _) = runner(eth_config(), &sim);
        runner.initialize().await.unwrap();
        runner.run_cycle().await.unwrap();

        let placed = sim.placed_orders().await;
        let entries: Vec<f64> = placed
            .iter()
            .filter(|o| o.order_type == OrderType::Limit && !o.reduce_only)
            .filter_map(|o| o.price)
            .collect();
        assert_eq!(entries, vec![3995.0, 3990.0]);
        // no inventory yet: the take-profit ladder starts with a top-up
        let top_up = placed.iter().find(|o| o.order_type == OrderType::Market).unwrap();
        assert!((top_up.size - 0.3).abs() < 1e-9);
        assert!((sim.position_amount(PositionSide::Long).await - 0.3).abs() < 1e-9);

        runner.run_cycle().await.unwrap();
        let tps: Vec<f64> = sim
            .resting_orders()
            .await
            .iter()
            .filter(|o| o.reduce_only)
            .map(|o| o.price)
            .collect();
        assert_eq!(tps, vec![4015.0, 4020.0, 4025.0]);
        assert!((runner.sizer().reserved(PositionSide::Long) - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_daily_report_once_per_date() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        let (mut runner, notifier) = runner(eth_config(), &sim);
        runner.stats.record_round_trip();
        let tomorrow = runner.stats().day().succ_opt().unwrap();

        sim.set_fail_reads(true).await;
        runner.report_daily_at(tomorrow).await;
        assert!(notifier.messages.lock().await.is_empty());
        assert_eq!(runner.stats().daily_trades, 1);

        sim.set_fail_reads(false).await;
        runner.report_daily_at(tomorrow).await;
        runner.report_daily_at(tomorrow).await;
        let messages = notifier.messages.lock().await.clone();
        assert_eq!(messages, vec!["u1 ETH-USD trades 1, balance 10000.00 & 10000.00".to_string()]);
        assert_eq!(runner.stats().daily_trades, 0);
        assert_eq!(runner.stats().total_trades, 1);
        assert_eq!(runner.stats().day(), tomorrow);
    }

    #[tokio::test]
    async fn test_worker_runs_and_stops_without_cancelling() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        let (runner, _) = runner(eth_config().with_sides(true, true), &sim);

        let worker = GridWorker::spawn(runner);
        assert_eq!(worker.symbol(), "ETH-USD");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.summary().status, BotStatus::Running);

        let runner = worker.stop().await.unwrap();
        assert_eq!(runner.status(), BotStatus::Stopped);
        assert!(sim.cancelled_ids().await.is_empty());

        let resting = sim.resting_orders().await;
        let has = |side: PositionSide, reduce_only: bool, price: f64| {
            resting
                .iter()
                .any(|o| o.position_side == side && o.reduce_only == reduce_only && o.price == price)
        };
        assert!(has(PositionSide::Long, false, 3995.0));
        assert!(has(PositionSide::Short, false, 4010.0));
        assert!(has(PositionSide::Long, true, 4015.0));
        assert!(has(PositionSide::Short, true, 3990.0));
        assert_eq!(runner.summary().long_levels, 5);
        assert_eq!(runner.summary().short_levels, 6);
    }

    #[tokio::test]
    async fn test_worker_stops_during_failed_initialization() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        sim.set_fail_reads(true).await;
        let (runner, _) = runner(eth_config().with_pauses(0, 5), &sim);

        let worker = GridWorker::spawn(runner);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let runner = worker.stop().await.unwrap();
        assert_eq!(runner.status(), BotStatus::Stopped);
        assert!(sim.placed_orders().await.is_empty());
    }

    #[test]
    fn test_summary_display() {
        let summary = RunnerSummary {
            symbol: "ETH-USD".into(),
            status: BotStatus::Running,
            last_price: 4001.0,
            fix_long: 4000.0,
            fix_short: 4005.0,
            long_position: 0.3,
            short_position: 0.0,
            long_reserved: 0.2,
            short_reserved: 0.0,
            long_levels: 3,
            short_levels: 0,
            total_trades: 7,
            daily_trades: 2,
        };
        let text = summary.to_string();
        assert!(text.starts_with("ETH-USD Running price=4001 band=4000/4005"));
        assert!(text.ends_with("trades=7 today=2"));
    }
}
