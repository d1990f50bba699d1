use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Smallest quantity difference worth recording as drift at all — below
/// this, rounding noise between the local ledger and the broker's own
/// bookkeeping is expected and not reported.
pub const DRIFT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001

/// A single symbol's local-vs-broker quantity mismatch.
#[derive(Clone, Debug, PartialEq)]
pub struct DriftEntry {
    pub symbol: String,
    pub local_qty: Decimal,
    pub broker_qty: Decimal,
    /// `local_qty - broker_qty`.
    pub delta: Decimal,
    /// `|delta| / max(|broker_qty|, epsilon) * 100`.
    pub pct_diff: Decimal,
}

impl DriftEntry {
    /// Critical at `pct_diff >= 10%` (spec §4.I).
    pub fn is_critical(&self) -> bool {
        self.pct_diff >= Decimal::from(10)
    }
}

/// One reconciliation pass's findings. Never auto-corrects anything — a
/// human (or separate tool) repairs any reported divergence.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileReport {
    pub ts: DateTime<Utc>,
    pub drifts: Vec<DriftEntry>,
    pub critical: bool,
}

impl ReconcileReport {
    pub fn clean(ts: DateTime<Utc>) -> Self {
        Self { ts, drifts: Vec::new(), critical: false }
    }
}
