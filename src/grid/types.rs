//! Core data types for grid trading

use std::fmt;

use serde::{Deserialize, Serialize};

/// Order side as sent to the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Convert to venue side string
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl From<&str> for OrderSide {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "B" | "BUY" => OrderSide::Buy,
            _ => OrderSide::Sell,
        }
    }
}

/// Which half of the hedge-mode book an order belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side of the order that opens or extends this position
    pub fn entry_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Side of the reduce-only order that closes this position
    pub fn close_side(&self) -> OrderSide {
        self.entry_side().opposite()
    }

    /// Infer the position side from an order's side and reduce-only flag
    pub fn of_order(side: OrderSide, reduce_only: bool) -> Self {
        match (side, reduce_only) {
            (OrderSide::Buy, false) | (OrderSide::Sell, true) => PositionSide::Long,
            (OrderSide::Sell, false) | (OrderSide::Buy, true) => PositionSide::Short,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
        }
    }
}

/// Order status as reported by the venue (detail query or open-order snapshot)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Failed,
    /// Anything the venue reports that we do not understand
    Unknown(String),
}

impl VenueStatus {
    /// Map a venue status string
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "open" | "new" => VenueStatus::New,
            "partially_filled" => VenueStatus::PartiallyFilled,
            "filled" => VenueStatus::Filled,
            "canceled" | "cancelled" => VenueStatus::Canceled,
            "rejected" | "failed" => VenueStatus::Failed,
            _ => VenueStatus::Unknown(raw.to_string()),
        }
    }
}

/// Lifecycle status of a ledger slot
///
/// `FilledOpenImmediate` and `FilledCloseImmediate` are synthetic: they are
/// inferred when a freshly placed order never showed up in the open-order
/// snapshot, and are never reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Entry order resting on the book
    New,
    PartiallyFilled,
    /// Entry filled, take-profit not yet attached
    Filled,
    /// Entry presumed filled before it could be observed resting
    FilledOpenImmediate,
    /// Take-profit resting, waiting for it to fill
    FilledCloseWait,
    /// Take-profit presumed filled before it could be observed resting
    FilledCloseImmediate,
    Canceled,
    /// Slot is free for a brand-new order
    Idle,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::FilledOpenImmediate => "FILLED_OPEN_IMMEDIATE",
            OrderStatus::FilledCloseWait => "FILLED_CLOSE_WAIT",
            OrderStatus::FilledCloseImmediate => "FILLED_CLOSE_IMMEDIATE",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Idle => "IDLE",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One grid order's full life: the entry leg and its linked take-profit leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Side of the entry order
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub order_type: OrderType,
    /// Entry limit price (0 when the entry is unknown, e.g. a seeded take-profit)
    pub price: f64,
    /// Target take-profit price
    pub tp_price: f64,
    pub size: f64,
    pub is_reduce_only: bool,
    /// Exchange id of the entry order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Exchange id of the linked take-profit order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tp_id: Option<String>,
    pub status: OrderStatus,
}

impl OrderRecord {
    /// A fresh limit entry order for a grid level
    pub fn entry(position_side: PositionSide, price: f64, size: f64) -> Self {
        Self {
            side: position_side.entry_side(),
            position_side,
            order_type: OrderType::Limit,
            price,
            tp_price: 0.0,
            size,
            is_reduce_only: false,
            id: None,
            tp_id: None,
            status: OrderStatus::New,
        }
    }

    /// A take-profit with no known entry leg
    pub fn take_profit(position_side: PositionSide, tp_price: f64, size: f64) -> Self {
        Self {
            tp_price,
            price: 0.0,
            ..Self::entry(position_side, 0.0, size)
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == OrderStatus::Idle
    }

    /// Entry leg still needs reconciling
    pub fn is_entry_pending(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::New | OrderStatus::PartiallyFilled | OrderStatus::FilledOpenImmediate
        )
    }

    /// Take-profit leg still needs reconciling
    pub fn is_awaiting_close(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::FilledCloseWait | OrderStatus::FilledCloseImmediate
        )
    }

    pub fn mark_idle(&mut self) {
        self.status = OrderStatus::Idle;
    }

    /// Request that places this record's take-profit at `tp_price`
    pub fn take_profit_request(&self) -> OrderRequest {
        OrderRequest::take_profit(self.position_side, self.tp_price, self.size)
    }
}

/// Position on one side of the book; amount is never negative
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_side: PositionSide,
    pub position_amt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub contract: String,
    pub last: f64,
}

/// One entry of the venue's open-order list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub price: f64,
    pub size: f64,
    pub reduce_only: bool,
    pub status: VenueStatus,
}

impl OrderSnapshot {
    pub fn is_entry_of(&self, position_side: PositionSide) -> bool {
        !self.reduce_only && self.position_side == position_side
    }

    pub fn is_take_profit_of(&self, position_side: PositionSide) -> bool {
        self.reduce_only && self.position_side == position_side
    }
}

/// Request to place an order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub order_type: OrderType,
    /// Limit price; `None` for market orders
    pub price: Option<f64>,
    pub size: f64,
    pub reduce_only: bool,
}

impl OrderRequest {
    /// Limit entry order opening `position_side`
    pub fn limit_entry(position_side: PositionSide, price: f64, size: f64) -> Self {
        Self {
            side: position_side.entry_side(),
            position_side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
            reduce_only: false,
        }
    }

    /// Market order growing `position_side`
    pub fn market_entry(position_side: PositionSide, size: f64) -> Self {
        Self {
            order_type: OrderType::Market,
            price: None,
            ..Self::limit_entry(position_side, 0.0, size)
        }
    }

    /// Reduce-only limit order closing `position_side`
    pub fn take_profit(position_side: PositionSide, price: f64, size: f64) -> Self {
        Self {
            side: position_side.close_side(),
            position_side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
            reduce_only: true,
        }
    }
}

/// Account balance
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub available: f64,
    pub total: f64,
}

/// Strategy loop status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    /// Fetching starting state and seeding the ledger
    Initializing,
    /// Normal grid operation
    Running,
    /// Fully stopped
    Stopped,
}
