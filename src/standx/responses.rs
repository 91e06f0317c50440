//! StandX wire types
//!
//! Numbers arrive as decimal strings; ids arrive as JSON numbers.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::grid::{OrderSide, OrderSnapshot, Position, PositionSide, VenueStatus};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberRepr {
    Text(String),
    Number(f64),
}

fn decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberRepr::deserialize(deserializer)? {
        NumberRepr::Text(s) => s.trim().parse().map_err(de::Error::custom),
        NumberRepr::Number(n) => Ok(n),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(i64),
    Text(String),
}

fn order_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Number(n) => n.to_string(),
        IdRepr::Text(s) => s,
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct SymbolPrice {
    #[serde(deserialize_with = "decimal")]
    pub(crate) last_price: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PositionEntry {
    #[serde(default, deserialize_with = "decimal")]
    pub(crate) qty: f64,
}

impl From<PositionEntry> for Position {
    /// Signed quantity: negative is a short
    fn from(entry: PositionEntry) -> Self {
        if entry.qty < 0.0 {
            Position {
                position_side: PositionSide::Short,
                position_amt: -entry.qty,
            }
        } else {
            Position {
                position_side: PositionSide::Long,
                position_amt: entry.qty,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenOrders {
    #[serde(default)]
    pub(crate) result: Vec<OpenOrderEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenOrderEntry {
    #[serde(deserialize_with = "order_id")]
    pub(crate) id: String,
    pub(crate) side: String,
    #[serde(deserialize_with = "decimal")]
    pub(crate) qty: f64,
    #[serde(deserialize_with = "decimal")]
    pub(crate) price: f64,
    #[serde(default)]
    pub(crate) reduce_only: bool,
    #[serde(default)]
    pub(crate) status: String,
}

impl From<OpenOrderEntry> for OrderSnapshot {
    fn from(entry: OpenOrderEntry) -> Self {
        let side = OrderSide::from(entry.side.as_str());
        OrderSnapshot {
            id: entry.id,
            side,
            position_side: PositionSide::of_order(side, entry.reduce_only),
            price: entry.price,
            size: entry.qty,
            reduce_only: entry.reduce_only,
            status: VenueStatus::parse(&entry.status),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderDetail {
    #[serde(default)]
    pub(crate) status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CrossBalance {
    #[serde(default, deserialize_with = "decimal")]
    pub(crate) cross_available: f64,
    #[serde(default, deserialize_with = "decimal")]
    pub(crate) cross_balance: f64,
}

/// Envelope of mutating calls; `message == "success"` means accepted
#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    #[serde(default)]
    pub(crate) message: Option<String>,
}

impl ApiMessage {
    pub(crate) fn is_success(&self) -> bool {
        self.message.as_deref() == Some("success")
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct NewOrder<'a> {
    pub(crate) symbol: &'a str,
    pub(crate) side: &'static str,
    pub(crate) order_type: &'static str,
    pub(crate) qty: String,
    pub(crate) reduce_only: bool,
    pub(crate) time_in_force: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) price: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CancelOrder {
    pub(crate) order_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_orders_derive_position_side() {
        let raw = r#"{"result":[
            {"id":101,"side":"buy","qty":"0.1","price":"3995.00","reduce_only":false,"status":"open"},
            {"id":102,"side":"sell","qty":"0.1","price":"4015.00","reduce_only":true,"status":"open"},
            {"id":103,"side":"sell","qty":"0.1","price":"4010.00","reduce_only":false,"status":"partially_filled"},
            {"id":104,"side":"buy","qty":"0.1","price":"3990.00","reduce_only":true,"status":"weird"}
        ]}"#;
        let orders: Vec<OrderSnapshot> = serde_json::from_str::<OpenOrders>(raw)
            .unwrap()
            .result
            .into_iter()
            .map(OrderSnapshot::from)
            .collect();

        let sides: Vec<PositionSide> = orders.iter().map(|o| o.position_side).collect();
        assert_eq!(
            sides,
            vec![PositionSide::Long, PositionSide::Long, PositionSide::Short, PositionSide::Short]
        );
        assert_eq!(orders[0].id, "101");
        assert_eq!(orders[0].price, 3995.0);
        assert_eq!(orders[1].side, OrderSide::Sell);
        assert_eq!(orders[2].status, VenueStatus::PartiallyFilled);
        assert_eq!(orders[3].status, VenueStatus::Unknown("weird".into()));
    }

    #[test]
    fn test_positions_from_signed_qty() {
        let raw = r#"[{"qty":"0.5"},{"qty":"-0.3"},{}]"#;
        let positions: Vec<Position> = serde_json::from_str::<Vec<PositionEntry>>(raw)
            .unwrap()
            .into_iter()
            .map(Position::from)
            .collect();
        assert_eq!(positions[0].position_side, PositionSide::Long);
        assert_eq!(positions[0].position_amt, 0.5);
        assert_eq!(positions[1].position_side, PositionSide::Short);
        assert_eq!(positions[1].position_amt, 0.3);
        assert_eq!(positions[2].position_amt, 0.0);
    }

    #[test]
    fn test_price_and_balance_accept_strings_or_numbers() {
        let price: SymbolPrice = serde_json::from_str(r#"{"last_price":"4001.25"}"#).unwrap();
        assert_eq!(price.last_price, 4001.25);
        let price: SymbolPrice = serde_json::from_str(r#"{"last_price":4001.5}"#).unwrap();
        assert_eq!(price.last_price, 4001.5);
        assert!(serde_json::from_str::<SymbolPrice>(r#"{"last_price":"n/a"}"#).is_err());

        let balance: CrossBalance =
            serde_json::from_str(r#"{"cross_available":"12.5","cross_balance":"20"}"#).unwrap();
        assert_eq!(balance.cross_available, 12.5);
        assert_eq!(balance.cross_balance, 20.0);
    }

    #[test]
    fn test_new_order_body_omits_missing_price() {
        let market = NewOrder {
            symbol: "ETH-USD",
            side: "buy",
            order_type: "market",
            qty: "0.3000".into(),
            reduce_only: false,
            time_in_force: "ioc",
            price: None,
        };
        let body = serde_json::to_value(&market).unwrap();
        assert!(body.get("price").is_none());
        assert_eq!(body["time_in_force"], "ioc");

        assert!(ApiMessage { message: Some("success".into()) }.is_success());
        assert!(!serde_json::from_str::<ApiMessage>(r#"{"message":"insufficient margin"}"#)
            .unwrap()
            .is_success());
    }
}
