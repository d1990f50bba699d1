use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Errors the Coordinator's public API can return. Per-bar recoverable
/// conditions (bad bars, risk violations, duplicate ids, broker failures)
/// are logged and swallowed inside `process_bar` itself — spec §7 requires
/// the coordinator never crash on a single-bar error — so this type only
/// covers operator-facing failures of explicit calls like `arm()`.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("cannot arm: risk engine is still halted ({0})")]
    StillHalted(String),
}

/// One closed-order fill, appended to the bounded trade log (§6 trade log
/// JSONL shape, carried in memory here; persistence of the JSONL file
/// itself is a thin caller concern layered on top).
#[derive(Clone, Debug, PartialEq)]
pub struct TradeLogEntry {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub qty_signed: Decimal,
    pub price: Decimal,
    pub realized_pnl: Decimal,
    pub order_id: String,
}

/// One point on the equity curve (§6 equity curve JSONL shape).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EquityPoint {
    pub ts: DateTime<Utc>,
    pub equity: Decimal,
}

/// Advisory hook for the out-of-scope capital-management subsystem (spec
/// §4.K step 7: "invoke capital-management hook (outside core)"). The core
/// only decides *when* this fires (>=12h since the last check); what it
/// does is entirely the caller's concern. Default: no-op.
pub trait WithdrawalHook: Send + Sync {
    fn maybe_withdraw(&self, equity: Decimal, now: DateTime<Utc>);
}

pub struct NoopWithdrawalHook;

impl WithdrawalHook for NoopWithdrawalHook {
    fn maybe_withdraw(&self, _equity: Decimal, _now: DateTime<Utc>) {}
}
