//! The Broker Adapter contract (§4.E): async submit/cancel/positions/
//! subscribe surface every concrete broker (paper or real) implements, plus
//! small reconnect/heartbeat helpers a real-broker adapter needs. A real
//! network implementation is out of scope beyond this trait; `mqk-broker-paper`
//! is the only in-repo implementation.

mod backoff;
mod heartbeat;
mod types;

pub use backoff::ReconnectBackoff;
pub use heartbeat::HeartbeatMonitor;
pub use types::{BrokerError, ExecutionReport, OrderKind, OrderRequest, OrderState, Side, TimeInForce};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Callback invoked on the broker's reader thread for every fill. Must
/// never block — see Design Notes §9 on the fill-handler deadlock pitfall.
pub type FillHandler = Arc<dyn Fn(ExecutionReport) + Send + Sync>;

/// Opaque handle to a live bar subscription, returned by `subscribe_bars`
/// and passed back to `unsubscribe`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// The broker adapter surface (§4.E). A real implementation must also:
/// - store `(symbol, handler, bar_size)` per subscription and replay it on
///   reconnect (`ReconnectBackoff` below provides the retry schedule);
/// - serialize its internal state (order→symbol map, subscriptions,
///   position cache) under its own locks, since fills/positions/heartbeats
///   arrive on a network reader thread distinct from the caller;
/// - embed a heartbeat task (`HeartbeatMonitor`) that triggers reconnect
///   after 120s of silence;
/// - never block the reader thread inside a `FillHandler` callback.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn start(&self) -> Result<(), BrokerError>;

    async fn stop(&self) -> Result<(), BrokerError>;

    /// Submit an order; returns the broker-assigned order id. This call is
    /// the authoritative acceptance point — the Coordinator only updates
    /// risk/idempotency state after this returns `Ok`.
    async fn submit(&self, order: OrderRequest) -> Result<String, BrokerError>;

    async fn cancel(&self, broker_order_id: &str) -> Result<bool, BrokerError>;

    /// Cancel every working order; returns the count cancelled.
    async fn cancel_all(&self) -> Result<usize, BrokerError>;

    /// `symbol -> (qty_signed, avg_price)`. A real implementation requests
    /// and awaits the broker's positions callback with a bounded timeout
    /// (~10s per §4.E).
    async fn get_positions(&self) -> Result<BTreeMap<String, (Decimal, Decimal)>, BrokerError>;

    async fn subscribe_bars(&self, symbol: &str, bar_size_secs: i64) -> Result<SubscriptionId, BrokerError>;

    async fn unsubscribe(&self, sub_id: SubscriptionId) -> Result<(), BrokerError>;

    /// Install the fill-notification callback. Replaces any prior handler.
    fn set_fill_handler(&self, handler: FillHandler);
}
