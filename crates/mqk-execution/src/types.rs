use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl Side {
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn from_signed_qty(signed_qty: Decimal) -> Side {
        if signed_qty >= Decimal::ZERO {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

/// Time-in-force. The spec names `tif` without enumerating values; day/GTC/
/// IOC is the standard equities/futures/crypto set every paper or real
/// broker in the corpus distinguishes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeInForce {
    Day,
    GoodTilCancel,
    ImmediateOrCancel,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OrderKind {
    Market,
    Limit { limit: Decimal },
    Stop { stop: Decimal },
}

/// An order the Coordinator is about to submit. `client_order_id` is the
/// deterministic id from `mqk_idempotency::generate_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub kind: OrderKind,
    pub tif: TimeInForce,
    pub submit_ts: DateTime<Utc>,
}

impl OrderRequest {
    pub fn new(
        client_order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        qty: Decimal,
        kind: OrderKind,
        tif: TimeInForce,
        submit_ts: DateTime<Utc>,
    ) -> Self {
        debug_assert!(qty > Decimal::ZERO, "OrderRequest.qty must be > 0");
        Self {
            client_order_id: client_order_id.into(),
            symbol: symbol.into(),
            side,
            qty,
            kind,
            tif,
            submit_ts,
        }
    }
}

/// Broker-local order lifecycle. `filled_qty + remaining_qty == qty` holds
/// in every state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderState {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

/// A single fill notification for a submitted order.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionReport {
    pub broker_order_id: String,
    pub symbol: String,
    pub side: Side,
    /// Quantity filled by *this* report only, never the cumulative total.
    pub qty: Decimal,
    pub price: Decimal,
    pub ts: DateTime<Utc>,
    pub is_partial: bool,
    pub cumulative_filled: Decimal,
    pub remaining: Decimal,
}

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum BrokerError {
    #[error("broker rejected submission for {client_order_id}: {reason}")]
    SubmitRejected { client_order_id: String, reason: String },
    #[error("broker not connected")]
    NotConnected,
    #[error("broker request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("unknown broker order id: {0}")]
    UnknownOrder(String),
    #[error("broker transport error: {0}")]
    Transport(String),
}
