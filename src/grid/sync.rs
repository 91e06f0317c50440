//! Order id synchronisation
//!
//! Placement returns no id and the open-order list lags behind it, so a
//! freshly placed order is located by polling the list. An order that never
//! shows up is assumed to have executed before the first poll.

use log::debug;

use super::runner::GridRunner;
use super::types::{OrderRecord, OrderSnapshot, OrderStatus, VenueStatus};

impl GridRunner {
    /// Poll the open-order list for up to `sync_attempts` rounds, pausing before each
    async fn poll_open_orders<F>(&mut self, matches: F) -> Option<String>
    where
        F: Fn(&OrderSnapshot) -> bool,
    {
        let interval = self.config.sync_interval();
        for attempt in 1..=self.config.sync_attempts {
            if interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(interval).await;
            }

            if let Err(e) = self.refresh_open_orders().await {
                debug!("[{}] Sync poll {} failed: {}", self.config.symbol, attempt, e);
                continue;
            }

            if let Some(found) = self.open_orders.iter().find(|o| matches(o)) {
                return Some(found.id.clone());
            }
        }
        None
    }

    /// Adopt the id of a just-placed entry order, or mark it filled on arrival
    pub(super) async fn sync_entry_id(&mut self, record: &mut OrderRecord) {
        let precision = self.config.precision;
        let target = precision.key(record.price);
        let (side, position_side) = (record.side, record.position_side);

        let found = self
            .poll_open_orders(|o| {
                o.side == side
                    && o.status == VenueStatus::New
                    && o.is_entry_of(position_side)
                    && precision.key(o.price) == target
            })
            .await;

        match found {
            Some(id) => {
                debug!("[{}] Synced entry {} id {}", self.config.symbol, record.price, id);
                record.id = Some(id);
                record.status = OrderStatus::New;
            }
            None => {
                debug!(
                    "[{}] Entry {} not in open orders, assuming filled",
                    self.config.symbol, record.price
                );
                record.status = OrderStatus::FilledOpenImmediate;
            }
        }
    }

    /// Adopt the id of a just-placed take-profit, or mark it closed on arrival
    pub(super) async fn sync_tp_id(&mut self, record: &mut OrderRecord) {
        let precision = self.config.precision;
        let target = precision.key(record.tp_price);
        let position_side = record.position_side;

        let found = self
            .poll_open_orders(|o| o.is_take_profit_of(position_side) && precision.key(o.price) == target)
            .await;

        match found {
            Some(id) => {
                debug!("[{}] Synced tp {} id {}", self.config.symbol, record.tp_price, id);
                record.tp_id = Some(id);
                record.status = OrderStatus::FilledCloseWait;
            }
            None => {
                debug!(
                    "[{}] Take-profit {} not in open orders, assuming filled",
                    self.config.symbol, record.tp_price
                );
                record.status = OrderStatus::FilledCloseImmediate;
            }
        }
    }
}
