//! Grid ledger: the authoritative local view of every grid level

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use super::config::GridConfig;
use super::price::PriceKey;
use super::types::{OrderRecord, OrderSnapshot, OrderStatus, PositionSide};

/// Per-side ordered map from price level to its order record
///
/// A level becomes free by marking its record `Idle`; records are only
/// removed when the venue reports the order as failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridLedger {
    long: BTreeMap<PriceKey, OrderRecord>,
    short: BTreeMap<PriceKey, OrderRecord>,
}

impl GridLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn side(&self, side: PositionSide) -> &BTreeMap<PriceKey, OrderRecord> {
        match side {
            PositionSide::Long => &self.long,
            PositionSide::Short => &self.short,
        }
    }

    fn side_mut(&mut self, side: PositionSide) -> &mut BTreeMap<PriceKey, OrderRecord> {
        match side {
            PositionSide::Long => &mut self.long,
            PositionSide::Short => &mut self.short,
        }
    }

    pub fn get(&self, side: PositionSide, key: PriceKey) -> Option<&OrderRecord> {
        self.side(side).get(&key)
    }

    pub fn get_mut(&mut self, side: PositionSide, key: PriceKey) -> Option<&mut OrderRecord> {
        self.side_mut(side).get_mut(&key)
    }

    /// Store a record at a level, replacing whatever was there
    pub fn insert(&mut self, side: PositionSide, key: PriceKey, record: OrderRecord) {
        self.side_mut(side).insert(key, record);
    }

    /// Drop a level entirely
    pub fn remove(&mut self, side: PositionSide, key: PriceKey) -> Option<OrderRecord> {
        self.side_mut(side).remove(&key)
    }

    /// Whether a new entry order may be placed at this level
    pub fn is_free(&self, side: PositionSide, key: PriceKey) -> bool {
        self.get(side, key).map_or(true, OrderRecord::is_idle)
    }

    /// Mark a level idle if it exists; returns whether it did
    pub fn release(&mut self, side: PositionSide, key: PriceKey) -> bool {
        match self.get_mut(side, key) {
            Some(record) => {
                record.mark_idle();
                true
            }
            None => false,
        }
    }

    /// Number of levels holding a non-idle record
    pub fn occupied(&self, side: PositionSide) -> usize {
        self.side(side).values().filter(|r| !r.is_idle()).count()
    }

    /// Levels whose entry leg needs reconciling, nearest the market first
    ///
    /// Long walks from the highest price down, short from the lowest up.
    pub fn entry_sweep_keys(&self, side: PositionSide) -> Vec<PriceKey> {
        let pending = self
            .side(side)
            .iter()
            .filter(|(_, r)| r.is_entry_pending())
            .map(|(k, _)| *k);
        match side {
            PositionSide::Long => pending.rev().collect(),
            PositionSide::Short => pending.collect(),
        }
    }

    /// Levels whose take-profit leg needs reconciling
    ///
    /// Long walks from the lowest price up, short from the highest down.
    pub fn tp_sweep_keys(&self, side: PositionSide) -> Vec<PriceKey> {
        let waiting = self
            .side(side)
            .iter()
            .filter(|(_, r)| r.is_awaiting_close())
            .map(|(k, _)| *k);
        match side {
            PositionSide::Long => waiting.collect(),
            PositionSide::Short => waiting.rev().collect(),
        }
    }

    /// Rebuild `side` from the orders already resting on the venue at startup
    ///
    /// Entries are keyed at their own price. Take-profits are keyed at the
    /// entry level they close (one interval closer to the market) and tracked
    /// as waiting to close, with no known entry price. Existing levels win.
    pub fn seed(&mut self, side: PositionSide, orders: &[OrderSnapshot], config: &GridConfig) -> usize {
        let precision = config.precision;
        let interval = config.interval_ticks();
        let mut seeded = 0;

        for order in orders.iter().filter(|o| o.position_side == side) {
            let price = precision.key(order.price);
            let (key, record) = if order.reduce_only {
                let key = match side {
                    PositionSide::Long => price.offset(-interval),
                    PositionSide::Short => price.offset(interval),
                };
                let mut record = OrderRecord::take_profit(side, precision.price(price), order.size);
                record.tp_id = Some(order.id.clone());
                record.status = OrderStatus::FilledCloseWait;
                (key, record)
            } else {
                let mut record = OrderRecord::entry(side, precision.price(price), order.size);
                record.id = Some(order.id.clone());
                (price, record)
            };

            if self.side(side).contains_key(&key) {
                continue;
            }
            info!(
                "[{}] Seeded {} {} level {} from open order {}",
                config.symbol,
                side,
                if order.reduce_only { "tp" } else { "entry" },
                precision.format_price(precision.price(key)),
                order.id
            );
            self.insert(side, key, record);
            seeded += 1;
        }

        seeded
    }
}
