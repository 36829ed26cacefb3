//! Order document sent to and returned by the REST API

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::parser::Side;

/// Order types
pub mod ord_type {
    pub const MARKET: &str = "Market";
    pub const LIMIT: &str = "Limit";
    pub const STOP: &str = "Stop";
    pub const STOP_LIMIT: &str = "StopLimit";
    pub const MARKET_IF_TOUCHED: &str = "MarketIfTouched";
    pub const LIMIT_IF_TOUCHED: &str = "LimitIfTouched";
    pub const PEGGED: &str = "Pegged";
}

/// Time in force
pub mod time_in_force {
    pub const DAY: &str = "Day";
    pub const GOOD_TILL_CANCEL: &str = "GoodTillCancel";
    pub const IMMEDIATE_OR_CANCEL: &str = "ImmediateOrCancel";
    pub const FILL_OR_KILL: &str = "FillOrKill";
}

/// Execution instructions
pub mod exec_inst {
    pub const PARTICIPATE_DO_NOT_INITIATE: &str = "ParticipateDoNotInitiate";
    pub const ALL_OR_NONE: &str = "AllOrNone";
    pub const MARK_PRICE: &str = "MarkPrice";
    pub const INDEX_PRICE: &str = "IndexPrice";
    pub const LAST_PRICE: &str = "LastPrice";
    pub const CLOSE: &str = "Close";
    pub const REDUCE_ONLY: &str = "ReduceOnly";
}

/// Order document. Unset fields are omitted from the request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "orderID", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    #[serde(rename = "clOrdID", skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,

    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub order_qty: Option<Decimal>,

    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,

    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_px: Option<Decimal>,

    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_qty: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ord_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_inst: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ord_status: Option<String>,

    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub leaves_qty: Option<Decimal>,

    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cum_qty: Option<Decimal>,

    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub avg_px: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transact_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            ..Default::default()
        }
    }

    /// Market order; a negative quantity sells
    pub fn market(symbol: &str, qty: Decimal) -> Self {
        Self {
            order_qty: Some(qty),
            ..Self::new(symbol)
        }
    }

    /// Market order with an explicit side
    pub fn market_side(symbol: &str, side: Side, qty: Decimal) -> Self {
        Self {
            side: Some(side),
            ord_type: Some(ord_type::MARKET.to_string()),
            ..Self::market(symbol, qty)
        }
    }

    /// Limit order; `post_only` adds `ParticipateDoNotInitiate`
    pub fn limit(symbol: &str, side: Side, qty: Decimal, price: Decimal, post_only: bool) -> Self {
        Self {
            side: Some(side),
            order_qty: Some(qty),
            price: Some(price),
            ord_type: Some(ord_type::LIMIT.to_string()),
            exec_inst: post_only.then(|| exec_inst::PARTICIPATE_DO_NOT_INITIATE.to_string()),
            ..Self::new(symbol)
        }
    }

    /// Order that only identifies an existing order, e.g. for cancellation
    pub fn with_id(order_id: &str) -> Self {
        Self {
            order_id: Some(order_id.to_string()),
            ..Default::default()
        }
    }

    pub fn cl_ord_id(mut self, cl_ord_id: &str) -> Self {
        self.cl_ord_id = Some(cl_ord_id.to_string());
        self
    }
}
