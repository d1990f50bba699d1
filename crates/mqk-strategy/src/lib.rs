//! The Decision Engine trait (§4.G): the trading policy the Coordinator
//! consults each bar. Opaque to the core — the Coordinator invokes it but
//! never interprets what it returns beyond the `Decision` fields.

mod types;

pub use types::{Decision, DecisionEngine, FillNotice, NoopDecisionEngine, TradeIntent};
