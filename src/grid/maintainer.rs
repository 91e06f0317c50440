//! Ladder maintenance: prune far orders, place entries, place take-profits,
//! top up inventory

use log::{debug, error, info, warn};

use super::runner::GridRunner;
use super::types::{OrderRecord, OrderRequest, PositionSide};

impl GridRunner {
    /// Cancel grid orders on `side` that drifted beyond the prune threshold
    ///
    /// Only orders of exactly one grid unit are touched. Cancelled entries
    /// free their ledger level. Cancelled orders leave the snapshot even if
    /// the cancel itself failed.
    pub(super) async fn prune_out_of_band(&mut self, side: PositionSide) {
        let precision = self.config.precision;
        let unit = self.config.grid_unit;
        let bands = self.bands;

        let mut kept = Vec::with_capacity(self.open_orders.len());
        for order in std::mem::take(&mut self.open_orders) {
            let price = precision.key(order.price);
            let stale = order.position_side == side
                && precision.same_size(order.size, unit)
                && if order.reduce_only {
                    bands.tp_out_of_band(side, price)
                } else {
                    bands.entry_out_of_band(side, price)
                };
            if !stale {
                kept.push(order);
                continue;
            }

            if let Err(e) = self.exchange.cancel_order(&self.config.symbol, &order.id).await {
                warn!("[{}] Cancel of far order {} failed: {}", self.config.symbol, order.id, e);
            }
            if !order.reduce_only && self.ledger.release(side, price) {
                debug!("[{}] {} level {} freed", self.config.symbol, side, order.price);
            }
            info!(
                "[{}] Cancelled far {} {} {} at {} (market {})",
                self.config.symbol,
                side,
                if order.reduce_only { "take-profit" } else { "entry" },
                order.id,
                order.price,
                self.last_price
            );
        }
        self.open_orders = kept;
    }

    /// Fill the entry window with limit orders at every free level
    pub(super) async fn place_entries(&mut self, side: PositionSide) {
        let precision = self.config.precision;
        let unit = self.config.grid_unit;

        for i in 0..self.config.window {
            let level = self.bands.entry_level(side, i);
            if self.bands.too_close_to_market(side, level, self.market) {
                continue;
            }

            let resting = self
                .open_orders
                .iter()
                .any(|o| o.is_entry_of(side) && precision.key(o.price) == level);
            if resting {
                continue;
            }

            if !self.ledger.is_free(side, level) {
                debug!(
                    "[{}] {} level {} occupied: {:?}",
                    self.config.symbol,
                    side,
                    precision.price(level),
                    self.ledger.get(side, level).map(|r| r.status)
                );
                continue;
            }

            let price = precision.price(level);
            let request = OrderRequest::limit_entry(side, price, unit);
            if let Err(e) = self.exchange.place_order(&self.config.symbol, &request).await {
                warn!("[{}] Failed to place {} entry at {}: {}", self.config.symbol, side, price, e);
                continue;
            }

            let mut record = OrderRecord::entry(side, price, unit);
            self.sync_entry_id(&mut record).await;
            info!(
                "[{}] TRADE {} entry placed at {} size {} ({:?}, {}) market {}",
                self.config.symbol, side, price, unit, record.id, record.status, self.last_price
            );
            self.ledger.insert(side, level, record);
        }
    }

    /// Keep take-profits resting beyond the window while inventory allows
    pub(super) async fn place_take_profits(&mut self, side: PositionSide) {
        let precision = self.config.precision;
        let unit = self.config.grid_unit;

        for i in 0..self.config.tp_levels {
            if self.sizer.is_short_of(side, unit) {
                debug!(
                    "[{}] {} inventory {} with {} reserved is short of a unit",
                    self.config.symbol,
                    side,
                    self.sizer.position(side),
                    self.sizer.reserved(side)
                );
                self.top_up(side).await;
                break;
            }

            let tp = self.bands.tp_level(side, i);
            let resting = self
                .open_orders
                .iter()
                .any(|o| o.is_take_profit_of(side) && precision.key(o.price) == tp);
            if resting {
                continue;
            }

            let mut record = OrderRecord::take_profit(side, precision.price(tp), unit);
            if let Err(e) = self
                .exchange
                .place_order(&self.config.symbol, &record.take_profit_request())
                .await
            {
                error!("[{}] Failed to place {} take-profit at {}: {}", self.config.symbol, side, record.tp_price, e);
                continue;
            }

            self.sync_tp_id(&mut record).await;
            self.sizer.reserve(side, unit);

            let attach = self.bands.tp_attach_key(side, tp);
            let attached = match self.ledger.get_mut(side, attach) {
                Some(existing) if !existing.is_idle() => {
                    existing.tp_id = record.tp_id.clone();
                    true
                }
                _ => false,
            };
            if !attached {
                self.ledger.insert(side, attach, record.clone());
            }
            info!(
                "[{}] TRADE {} take-profit placed at {} ({:?}) level {}",
                self.config.symbol,
                side,
                record.tp_price,
                record.tp_id,
                precision.price(attach)
            );
        }
    }

    /// Grow the position by one window of units unless it is already at the cap
    pub(super) async fn top_up(&mut self, side: PositionSide) {
        let cap = self.config.inventory_cap();
        if !self.sizer.below_cap(side, cap) {
            debug!(
                "[{}] {} position {} at cap {}, no top-up",
                self.config.symbol,
                side,
                self.sizer.position(side),
                cap
            );
            return;
        }

        let size = self.config.window_size();
        match self
            .exchange
            .place_order(&self.config.symbol, &OrderRequest::market_entry(side, size))
            .await
        {
            Ok(()) => info!(
                "[{}] TRADE {} position topped up by {} at {}",
                self.config.symbol, side, size, self.last_price
            ),
            Err(e) => warn!("[{}] {} top-up failed: {}", self.config.symbol, side, e),
        }

        let settle = self.config.top_up_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
    }
}
