//! Fill detection by polling
//!
//! Two sweeps per side: entries (is the opening order filled yet?) and
//! take-profits (has the closing order completed the round trip?). Each
//! sweep stops at the first level that is still resting, nearest the
//! market first.

use log::{debug, error, info, warn};

use super::price::PriceKey;
use super::runner::GridRunner;
use super::types::{OrderRecord, OrderStatus, PositionSide, VenueStatus};

impl GridRunner {
    /// Advance entry orders; filled ones get a take-profit attached
    pub(super) async fn check_filled_entries(&mut self, side: PositionSide) {
        let symbol = self.config.symbol.clone();

        for key in self.ledger.entry_sweep_keys(side) {
            let Some(mut record) = self.ledger.get(side, key).cloned() else {
                continue;
            };

            if record.status != OrderStatus::FilledOpenImmediate {
                let Some(id) = record.id.clone() else {
                    warn!("[{}] {} entry at {} has no order id, leaving it", symbol, side, record.price);
                    continue;
                };

                let status = match self.exchange.get_order_status(&symbol, &id).await {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("[{}] Status query for entry {} failed: {}", symbol, id, e);
                        continue;
                    }
                };
                debug!("[{}] {} entry {} at {} is {:?}", symbol, side, id, record.price, status);

                match status {
                    VenueStatus::Filled => {
                        info!("[{}] TRADE {} entry filled at {}", symbol, side, record.price);
                        record.status = OrderStatus::Filled;
                    }
                    VenueStatus::Failed => {
                        error!("[{}] {} entry {} failed, freeing level {}", symbol, side, id, record.price);
                        self.ledger.remove(side, key);
                        break;
                    }
                    VenueStatus::New => break,
                    VenueStatus::PartiallyFilled => {
                        if let Some(slot) = self.ledger.get_mut(side, key) {
                            slot.status = OrderStatus::PartiallyFilled;
                        }
                        break;
                    }
                    VenueStatus::Canceled => {
                        debug!("[{}] {} entry {} canceled", symbol, side, id);
                        self.ledger.release(side, key);
                        break;
                    }
                    VenueStatus::Unknown(raw) => {
                        warn!("[{}] {} entry {} has unexpected status {}", symbol, side, id, raw);
                        break;
                    }
                }
            }

            self.attach_take_profit(side, key, record).await;
        }
    }

    /// Place the take-profit for a filled entry, refreshing the price between attempts
    async fn attach_take_profit(&mut self, side: PositionSide, key: PriceKey, mut record: OrderRecord) {
        let precision = self.config.precision;
        let entry = precision.key(record.price);

        for attempt in 1..=self.config.tp_place_attempts {
            let tp = self.bands.desired_tp(side, entry);
            record.size = self.config.grid_unit;
            record.tp_price = precision.price(tp);

            match self
                .exchange
                .place_order(&self.config.symbol, &record.take_profit_request())
                .await
            {
                Ok(()) => {
                    self.sync_tp_id(&mut record).await;
                    info!(
                        "[{}] TRADE {} take-profit {} placed for entry {} ({:?})",
                        self.config.symbol,
                        side,
                        record.tp_price,
                        record.price,
                        record.tp_id
                    );
                    self.ledger.insert(side, key, record);
                    return;
                }
                Err(e) => {
                    warn!(
                        "[{}] Take-profit {} attempt {}/{} failed: {}",
                        self.config.symbol, record.tp_price, attempt, self.config.tp_place_attempts, e
                    );
                    if let Err(e) = self.refresh_price().await {
                        debug!("[{}] Price refresh between attempts failed: {}", self.config.symbol, e);
                    }
                }
            }
        }

        error!(
            "[{}] Could not attach take-profit to {} entry {}, retrying next cycle",
            self.config.symbol, side, record.price
        );
        record.status = OrderStatus::FilledOpenImmediate;
        self.ledger.insert(side, key, record);
    }

    /// Advance take-profits; a fill completes the round trip and frees the level
    pub(super) async fn check_filled_take_profits(&mut self, side: PositionSide) {
        let symbol = self.config.symbol.clone();

        for key in self.ledger.tp_sweep_keys(side) {
            let Some(record) = self.ledger.get(side, key).cloned() else {
                continue;
            };

            if record.status != OrderStatus::FilledCloseImmediate {
                let Some(tp_id) = record.tp_id.clone() else {
                    warn!("[{}] {} level {} waits on a take-profit without id", symbol, side, record.price);
                    continue;
                };

                let status = match self.exchange.get_order_status(&symbol, &tp_id).await {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("[{}] Status query for take-profit {} failed: {}", symbol, tp_id, e);
                        continue;
                    }
                };
                debug!("[{}] {} take-profit {} at {} is {:?}", symbol, side, tp_id, record.tp_price, status);

                match status {
                    VenueStatus::Filled => {}
                    VenueStatus::Failed => {
                        error!("[{}] {} take-profit {} failed, dropping level", symbol, side, tp_id);
                        self.ledger.remove(side, key);
                        break;
                    }
                    VenueStatus::New => {
                        if self.replace_drifted_take_profit(side, key, record, &tp_id).await {
                            break;
                        }
                        continue;
                    }
                    VenueStatus::PartiallyFilled => break,
                    VenueStatus::Canceled => {
                        debug!("[{}] {} take-profit {} canceled", symbol, side, tp_id);
                        self.ledger.release(side, key);
                        break;
                    }
                    VenueStatus::Unknown(raw) => {
                        warn!("[{}] {} take-profit {} has unexpected status {}", symbol, side, tp_id, raw);
                        break;
                    }
                }
            }

            self.stats.record_round_trip();
            self.ledger.release(side, key);
            info!(
                "[{}] TRADE {} round trip complete at {} -> {} (total {}, today {})",
                symbol, side, record.price, record.tp_price, self.stats.total_trades, self.stats.daily_trades
            );
        }
    }

    /// Move a resting take-profit to the current ideal price if it drifted
    ///
    /// The new order goes in before the old one is cancelled. Returns `false`
    /// only when the new order could not be placed.
    async fn replace_drifted_take_profit(
        &mut self,
        side: PositionSide,
        key: PriceKey,
        mut record: OrderRecord,
        old_tp_id: &str,
    ) -> bool {
        let precision = self.config.precision;
        let desired = self.bands.desired_tp(side, precision.key(record.price));
        let current = precision.key(record.tp_price);
        if record.price <= 0.0 || current.distance(desired) <= 1 {
            return true;
        }

        let previous_tp = record.tp_price;
        record.size = self.config.grid_unit;
        record.tp_price = precision.price(desired);
        if let Err(e) = self
            .exchange
            .place_order(&self.config.symbol, &record.take_profit_request())
            .await
        {
            warn!(
                "[{}] Failed to move {} take-profit {} -> {}: {}",
                self.config.symbol, side, previous_tp, record.tp_price, e
            );
            return false;
        }

        if let Err(e) = self.exchange.cancel_order(&self.config.symbol, old_tp_id).await {
            warn!("[{}] Cancel of replaced take-profit {} failed: {}", self.config.symbol, old_tp_id, e);
        }
        record.tp_id = None;
        self.sync_tp_id(&mut record).await;
        info!(
            "[{}] TRADE {} take-profit moved {} -> {} ({} -> {:?})",
            self.config.symbol, side, previous_tp, record.tp_price, old_tp_id, record.tp_id
        );
        self.ledger.insert(side, key, record);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::grid::runner::test_support::{eth_config, runner};
    use crate::grid::sim::SimExchange;
    use crate::grid::types::OrderRequest;

    fn filled_on_arrival(side: PositionSide, price: f64) -> OrderRecord {
        let mut record = OrderRecord::entry(side, price, 0.1);
        record.status = OrderStatus::FilledOpenImmediate;
        record
    }

    fn resting_entry(side: PositionSide, price: f64, id: &str) -> OrderRecord {
        let mut record = OrderRecord::entry(side, price, 0.1);
        record.id = Some(id.to_string());
        record
    }

    fn waiting_close(side: PositionSide, price: f64, tp_price: f64, tp_id: &str) -> OrderRecord {
        let mut record = OrderRecord::entry(side, price, 0.1);
        record.tp_price = tp_price;
        record.tp_id = Some(tp_id.to_string());
        record.status = OrderStatus::FilledCloseWait;
        record
    }

    #[tokio::test]
    async fn test_filled_on_arrival_attaches_without_status_query() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        sim.set_position(PositionSide::Long, 1.0).await;
        let (mut runner, _) = runner(eth_config(), &sim);
        runner.refresh_price().await.unwrap();

        let key = runner.config.precision.key(3995.0);
        runner.ledger.insert(PositionSide::Long, key, filled_on_arrival(PositionSide::Long, 3995.0));
        runner.check_filled_entries(PositionSide::Long).await;

        assert!(sim.status_queries().await.is_empty());
        let record = runner.ledger.get(PositionSide::Long, key).unwrap();
        assert_eq!(record.status, OrderStatus::FilledCloseWait);
        assert_eq!(record.tp_price, 4005.0);
        assert_eq!(record.tp_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_round_trip_frees_level_and_counts() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        let (mut runner, _) = runner(eth_config(), &sim);
        runner.refresh_price().await.unwrap();
        runner.refresh_open_orders().await.unwrap();
        runner.place_entries(PositionSide::Long).await;

        sim.set_price(3994.0).await;
        runner.refresh_price().await.unwrap();
        runner.check_filled_entries(PositionSide::Long).await;

        // 3995 filled, the sweep stops at 3990 which is still resting
        assert_eq!(sim.status_queries().await, vec!["1".to_string(), "2".to_string()]);
        let key = runner.config.precision.key(3995.0);
        let record = runner.ledger.get(PositionSide::Long, key).unwrap().clone();
        assert_eq!(record.status, OrderStatus::FilledCloseWait);
        assert_eq!(record.tp_price, 4000.0);
        assert_eq!(record.tp_id.as_deref(), Some("3"));

        sim.set_price(4000.0).await;
        runner.check_filled_take_profits(PositionSide::Long).await;
        assert_eq!(runner.stats.total_trades, 1);
        assert_eq!(runner.stats.daily_trades, 1);
        assert!(runner.ledger.is_free(PositionSide::Long, key));
        assert_eq!(runner.ledger.get(PositionSide::Long, key).unwrap().status, OrderStatus::Idle);
    }

    #[tokio::test]
    async fn test_drifted_take_profit_is_replaced_before_cancel() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4012.0));
        sim.set_position(PositionSide::Long, 1.0).await;
        let (mut runner, _) = runner(eth_config(), &sim);
        runner.refresh_price().await.unwrap();

        let key = runner.config.precision.key(3995.0);
        runner.ledger.insert(PositionSide::Long, key, filled_on_arrival(PositionSide::Long, 3995.0));
        runner.check_filled_entries(PositionSide::Long).await;
        assert_eq!(runner.ledger.get(PositionSide::Long, key).unwrap().tp_price, 4015.0);

        // still the ideal price: nothing moves
        runner.check_filled_take_profits(PositionSide::Long).await;
        assert_eq!(sim.placed_orders().await.len(), 1);

        sim.set_price(3996.0).await;
        runner.refresh_price().await.unwrap();
        runner.check_filled_take_profits(PositionSide::Long).await;

        let record = runner.ledger.get(PositionSide::Long, key).unwrap();
        assert_eq!(record.tp_price, 4000.0);
        assert_eq!(record.tp_id.as_deref(), Some("2"));
        assert_eq!(record.status, OrderStatus::FilledCloseWait);
        assert_eq!(sim.cancelled_ids().await, vec!["1".to_string()]);

        let resting: Vec<f64> = sim.resting_orders().await.iter().map(|o| o.price).collect();
        assert_eq!(resting, vec![4000.0]);
        assert_eq!(runner.stats.total_trades, 0);
    }

    #[tokio::test]
    async fn test_attach_gives_up_after_rejections() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        sim.set_position(PositionSide::Long, 1.0).await;
        sim.reject_next_places(10).await;
        let (mut runner, _) = runner(eth_config(), &sim);
        runner.refresh_price().await.unwrap();

        let key = runner.config.precision.key(3995.0);
        runner.ledger.insert(PositionSide::Long, key, filled_on_arrival(PositionSide::Long, 3995.0));
        runner.check_filled_entries(PositionSide::Long).await;
        assert_eq!(sim.placed_orders().await.len(), 10);
        let record = runner.ledger.get(PositionSide::Long, key).unwrap();
        assert_eq!(record.status, OrderStatus::FilledOpenImmediate);
        assert_eq!(record.tp_id, None);

        runner.check_filled_entries(PositionSide::Long).await;
        let record = runner.ledger.get(PositionSide::Long, key).unwrap();
        assert_eq!(record.status, OrderStatus::FilledCloseWait);
        assert!(record.tp_id.is_some());
    }

    #[tokio::test]
    async fn test_canceled_entry_frees_and_failed_take_profit_drops() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        let (mut runner, _) = runner(eth_config(), &sim);
        runner.refresh_price().await.unwrap();
        let precision = runner.config.precision;

        let entry_id = sim
            .insert_resting(OrderRequest::limit_entry(PositionSide::Long, 3990.0, 0.1))
            .await;
        sim.set_status_override(&entry_id, VenueStatus::Canceled).await;
        let mut entry = OrderRecord::entry(PositionSide::Long, 3990.0, 0.1);
        entry.id = Some(entry_id);
        runner.ledger.insert(PositionSide::Long, precision.key(3990.0), entry);

        let mut tp = OrderRecord::entry(PositionSide::Long, 3995.0, 0.1);
        tp.tp_price = 4005.0;
        tp.tp_id = Some("77".into());
        tp.status = OrderStatus::FilledCloseWait;
        sim.set_status_override("77", VenueStatus::Failed).await;
        runner.ledger.insert(PositionSide::Long, precision.key(3995.0), tp);

        runner.check_filled_entries(PositionSide::Long).await;
        runner.check_filled_take_profits(PositionSide::Long).await;

        assert!(runner.ledger.is_free(PositionSide::Long, precision.key(3990.0)));
        assert!(runner.ledger.get(PositionSide::Long, precision.key(3990.0)).is_some());
        assert!(runner.ledger.get(PositionSide::Long, precision.key(3995.0)).is_none());
        assert_eq!(runner.stats.total_trades, 0);
    }

    #[tokio::test]
    async fn test_entry_sweep_stops_on_partial_and_unknown_and_drops_failed() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        let (mut runner, _) = runner(eth_config(), &sim);
        let precision = runner.config.precision;
        let long = PositionSide::Long;
        for (price, id) in [(3995.0, "11"), (3990.0, "12"), (3985.0, "13")] {
            runner.ledger.insert(long, precision.key(price), resting_entry(long, price, id));
        }
        let nearest = precision.key(3995.0);

        sim.set_status_override("11", VenueStatus::PartiallyFilled).await;
        runner.check_filled_entries(long).await;
        assert_eq!(sim.status_queries().await, vec!["11".to_string()]);
        assert_eq!(runner.ledger.get(long, nearest).unwrap().status, OrderStatus::PartiallyFilled);

        sim.set_status_override("11", VenueStatus::Unknown("halted".into())).await;
        runner.check_filled_entries(long).await;
        assert_eq!(sim.status_queries().await.len(), 2);
        let record = runner.ledger.get(long, nearest).unwrap();
        assert_eq!(record.status, OrderStatus::PartiallyFilled);
        assert_eq!(record.id.as_deref(), Some("11"));

        sim.set_status_override("11", VenueStatus::Failed).await;
        runner.check_filled_entries(long).await;
        assert_eq!(sim.status_queries().await.len(), 3);
        assert!(runner.ledger.get(long, nearest).is_none());
        assert_eq!(
            runner.ledger.get(long, precision.key(3990.0)).unwrap().status,
            OrderStatus::New
        );
        assert!(sim.placed_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_take_profit_partial_waits_and_canceled_goes_idle() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        let (mut runner, _) = runner(eth_config(), &sim);
        let precision = runner.config.precision;
        let long = PositionSide::Long;
        runner
            .ledger
            .insert(long, precision.key(3990.0), waiting_close(long, 3990.0, 4005.0, "21"));
        runner
            .ledger
            .insert(long, precision.key(3995.0), waiting_close(long, 3995.0, 4005.0, "22"));
        let lowest = precision.key(3990.0);

        sim.set_status_override("21", VenueStatus::PartiallyFilled).await;
        runner.check_filled_take_profits(long).await;
        assert_eq!(sim.status_queries().await, vec!["21".to_string()]);
        let record = runner.ledger.get(long, lowest).unwrap();
        assert_eq!(record.status, OrderStatus::FilledCloseWait);
        assert_eq!(record.tp_id.as_deref(), Some("21"));

        sim.set_status_override("21", VenueStatus::Canceled).await;
        runner.check_filled_take_profits(long).await;
        assert_eq!(sim.status_queries().await, vec!["21".to_string(), "21".to_string()]);
        assert!(runner.ledger.is_free(long, lowest));
        assert_eq!(runner.ledger.get(long, lowest).unwrap().status, OrderStatus::Idle);
        assert_eq!(
            runner.ledger.get(long, precision.key(3995.0)).unwrap().status,
            OrderStatus::FilledCloseWait
        );
        assert_eq!(runner.stats.total_trades, 0);
    }

    #[tokio::test]
    async fn test_short_sweeps_start_nearest_the_market() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 4000.0));
        let (mut runner, _) = runner(eth_config().with_sides(false, true), &sim);
        let precision = runner.config.precision;
        let short = PositionSide::Short;
        runner.ledger.insert(short, precision.key(4005.0), resting_entry(short, 4005.0, "41"));
        runner.ledger.insert(short, precision.key(4010.0), resting_entry(short, 4010.0, "42"));
        sim.set_status_override("41", VenueStatus::New).await;

        runner.check_filled_entries(short).await;
        assert_eq!(sim.status_queries().await, vec!["41".to_string()]);

        runner.ledger.insert(short, precision.key(4015.0), waiting_close(short, 4015.0, 3995.0, "31"));
        runner.ledger.insert(short, precision.key(4020.0), waiting_close(short, 4020.0, 3990.0, "32"));
        sim.set_status_override("32", VenueStatus::PartiallyFilled).await;

        runner.check_filled_take_profits(short).await;
        assert_eq!(sim.status_queries().await, vec!["41".to_string(), "32".to_string()]);
    }

    #[tokio::test]
    async fn test_short_take_profit_follows_the_market_up() {
        let sim = Arc::new(SimExchange::new("ETH-USD", 3988.0));
        sim.set_position(PositionSide::Short, 1.0).await;
        let (mut runner, _) = runner(eth_config().with_sides(false, true), &sim);
        runner.refresh_price().await.unwrap();
        let short = PositionSide::Short;

        // fix_short 3990: the take-profit sits one interval below it
        let key = runner.config.precision.key(4005.0);
        runner.ledger.insert(short, key, filled_on_arrival(short, 4005.0));
        runner.check_filled_entries(short).await;
        let record = runner.ledger.get(short, key).unwrap();
        assert_eq!(record.tp_price, 3985.0);
        assert_eq!(record.tp_id.as_deref(), Some("1"));

        sim.set_price(4003.0).await;
        runner.refresh_price().await.unwrap();
        runner.check_filled_take_profits(short).await;

        let record = runner.ledger.get(short, key).unwrap();
        assert_eq!(record.tp_price, 4000.0);
        assert_eq!(record.tp_id.as_deref(), Some("2"));
        assert_eq!(record.status, OrderStatus::FilledCloseWait);
        assert_eq!(sim.cancelled_ids().await, vec!["1".to_string()]);

        let resting = sim.resting_orders().await;
        assert_eq!(resting.len(), 1);
        assert_eq!(resting[0].id, "2");
        assert_eq!(resting[0].price, 4000.0);
        assert!(resting[0].reduce_only);
        assert_eq!(runner.stats.total_trades, 0);
    }
}
