//! Inventory tracking and top-up decisions

use serde::{Deserialize, Serialize};

use super::types::{OrderSnapshot, Position, PositionSide};

/// Sizes below this are treated as zero when comparing inventory
const SIZE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct SideInventory {
    position: f64,
    reserved: f64,
}

/// Position per side and the size already committed to resting take-profits
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySizer {
    long: SideInventory,
    short: SideInventory,
}

impl InventorySizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn side(&self, side: PositionSide) -> &SideInventory {
        match side {
            PositionSide::Long => &self.long,
            PositionSide::Short => &self.short,
        }
    }

    fn side_mut(&mut self, side: PositionSide) -> &mut SideInventory {
        match side {
            PositionSide::Long => &mut self.long,
            PositionSide::Short => &mut self.short,
        }
    }

    /// Replace both sides from a venue position list; absent sides are flat
    pub fn update_positions(&mut self, positions: &[Position]) {
        self.long.position = 0.0;
        self.short.position = 0.0;
        for pos in positions {
            self.side_mut(pos.position_side).position = pos.position_amt.abs();
        }
    }

    pub fn position(&self, side: PositionSide) -> f64 {
        self.side(side).position
    }

    pub fn reserved(&self, side: PositionSide) -> f64 {
        self.side(side).reserved
    }

    /// Recompute the reserved size from the resting take-profits on `side`
    pub fn count_reserved(&mut self, side: PositionSide, open_orders: &[OrderSnapshot]) {
        self.side_mut(side).reserved = open_orders
            .iter()
            .filter(|o| o.is_take_profit_of(side))
            .map(|o| o.size)
            .sum();
    }

    /// Account for a take-profit placed since the last recount
    pub fn reserve(&mut self, side: PositionSide, size: f64) {
        self.side_mut(side).reserved += size;
    }

    /// Position not yet covered by a take-profit
    pub fn free(&self, side: PositionSide) -> f64 {
        let inv = self.side(side);
        inv.position - inv.reserved
    }

    /// Whether another take-profit of `unit` cannot be covered
    pub fn is_short_of(&self, side: PositionSide, unit: f64) -> bool {
        self.free(side) + SIZE_EPSILON < unit
    }

    /// Whether a top-up is still allowed under `cap`
    pub fn below_cap(&self, side: PositionSide, cap: f64) -> bool {
        self.position(side) + SIZE_EPSILON < cap
    }
}
