//! Typed rows of the routed data tables

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::subscription::{KindRegistry, SubscriptionRegistry};

/// Event kinds the client demultiplexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Trade,
    Quote,
    Order,
    Position,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Trade,
        EventKind::Quote,
        EventKind::Order,
        EventKind::Position,
    ];

    /// Table name used by the venue
    pub fn table(&self) -> &'static str {
        match self {
            EventKind::Trade => "trade",
            EventKind::Quote => "quote",
            EventKind::Order => "order",
            EventKind::Position => "position",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.table() == table)
    }

    /// Private tables require authentication and are not symbol-scoped on
    /// the wire.
    pub fn is_private(&self) -> bool {
        matches!(self, EventKind::Order | EventKind::Position)
    }

    /// Topic to subscribe for one symbol, or for everything when `None`
    pub fn topic(&self, symbol: Option<&str>) -> String {
        match symbol {
            Some(symbol) if !self.is_private() => format!("{}:{}", self.table(), symbol),
            _ => self.table().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A decoded row that can be routed to subscribers
pub trait Record: DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EventKind;

    /// Instrument symbol used as the filter key
    fn symbol(&self) -> &str;

    /// The registry holding subscribers of this kind
    fn registrations(registry: &SubscriptionRegistry) -> &KindRegistry<Self>;
}

/// Order or trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Public trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Option<Side>,
    pub size: Decimal,
    pub price: Decimal,
    pub tick_direction: Option<String>,

    #[serde(rename = "trdMatchID")]
    pub trade_match_id: Option<String>,

    pub gross_value: Option<i64>,
    pub home_notional: Option<Decimal>,
    pub foreign_notional: Option<Decimal>,
}

/// Top-of-book quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub bid_size: Option<Decimal>,
    pub bid_price: Option<Decimal>,
    pub ask_price: Option<Decimal>,
    pub ask_size: Option<Decimal>,
}

impl Quote {
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.bid_price, self.ask_price) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }
}

/// Private order update. Update rows only carry the changed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    #[serde(rename = "orderID")]
    pub order_id: String,

    #[serde(rename = "clOrdID")]
    pub cl_ord_id: Option<String>,

    pub account: Option<i64>,
    pub symbol: String,
    pub side: Option<Side>,
    pub order_qty: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_px: Option<Decimal>,
    pub ord_type: Option<String>,
    pub time_in_force: Option<String>,
    pub exec_inst: Option<String>,
    pub ord_status: Option<String>,
    pub leaves_qty: Option<Decimal>,
    pub cum_qty: Option<Decimal>,
    pub avg_px: Option<Decimal>,
    pub text: Option<String>,
    pub transact_time: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Private position update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub account: i64,
    pub symbol: String,
    pub currency: Option<String>,
    pub current_qty: Option<i64>,
    pub avg_entry_price: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub liquidation_price: Option<Decimal>,
    pub unrealised_pnl: Option<i64>,
    pub realised_pnl: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Record for Trade {
    const KIND: EventKind = EventKind::Trade;

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn registrations(registry: &SubscriptionRegistry) -> &KindRegistry<Self> {
        &registry.trades
    }
}

impl Record for Quote {
    const KIND: EventKind = EventKind::Quote;

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn registrations(registry: &SubscriptionRegistry) -> &KindRegistry<Self> {
        &registry.quotes
    }
}

impl Record for OrderUpdate {
    const KIND: EventKind = EventKind::Order;

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn registrations(registry: &SubscriptionRegistry) -> &KindRegistry<Self> {
        &registry.orders
    }
}

impl Record for Position {
    const KIND: EventKind = EventKind::Position;

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn registrations(registry: &SubscriptionRegistry) -> &KindRegistry<Self> {
        &registry.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_topics() {
        assert_eq!(EventKind::Trade.topic(Some("XBTUSD")), "trade:XBTUSD");
        assert_eq!(EventKind::Quote.topic(None), "quote");
        assert_eq!(EventKind::Order.topic(Some("XBTUSD")), "order");
        assert_eq!(EventKind::from_table("position"), Some(EventKind::Position));
        assert_eq!(EventKind::from_table("orderBookL2"), None);
    }

    #[test]
    fn test_decode_quote() {
        let raw = r#"{
            "timestamp": "2018-10-26T07:28:00.542Z",
            "symbol": "XBTUSD",
            "bidSize": 1200,
            "bidPrice": 6500,
            "askPrice": 6500.5,
            "askSize": 3000
        }"#;

        let quote: Quote = serde_json::from_str(raw).unwrap();
        assert_eq!(quote.bid_size, Some(dec!(1200)));
        assert_eq!(quote.mid_price(), Some(dec!(6500.25)));
    }

    #[test]
    fn test_decode_partial_order_update() {
        let raw = r#"{
            "orderID": "a1b2c3d4-0000-0000-0000-000000000000",
            "clOrdID": "",
            "account": 12345,
            "symbol": "XBTUSD",
            "ordStatus": "Filled",
            "leavesQty": 0,
            "cumQty": 100,
            "avgPx": 6501,
            "timestamp": "2018-10-26T07:28:01.000Z"
        }"#;

        let order: OrderUpdate = serde_json::from_str(raw).unwrap();
        assert_eq!(order.symbol(), "XBTUSD");
        assert_eq!(order.ord_status.as_deref(), Some("Filled"));
        assert_eq!(order.price, None);
        assert_eq!(order.cum_qty, Some(dec!(100)));
    }

    #[test]
    fn test_decode_position() {
        let raw = r#"{
            "account": 12345,
            "symbol": "XBTUSD",
            "currency": "XBt",
            "currentQty": -100,
            "markPrice": 6499.87,
            "liquidationPrice": null
        }"#;

        let position: Position = serde_json::from_str(raw).unwrap();
        assert_eq!(position.current_qty, Some(-100));
        assert_eq!(position.liquidation_price, None);
        assert_eq!(position.mark_price, Some(dec!(6499.87)));
    }
}
