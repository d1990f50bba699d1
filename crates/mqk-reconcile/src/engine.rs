//! Periodic local-vs-broker position drift detection (§4.I).
//!
//! Never auto-corrects: a critical mismatch (`>= 10%` drift on any symbol)
//! halts the Risk Engine and waits for an operator. Minor drift is recorded
//! for diagnostics only.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::types::{DriftEntry, ReconcileReport, DRIFT_EPSILON};

/// Bounded ring of past reports, kept for diagnostics.
const ALERT_RING_CAPACITY: usize = 200;

pub struct Reconciler {
    interval: Duration,
    last_run: Option<DateTime<Utc>>,
    alerts: VecDeque<ReconcileReport>,
}

impl Reconciler {
    pub fn new(interval_minutes: i64) -> Self {
        Self {
            interval: Duration::minutes(interval_minutes),
            last_run: None,
            alerts: VecDeque::new(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    /// Compare local positions against the broker's reported positions and
    /// return the drift report. Halts `risk_state` (via `mqk_risk::force_halt`)
    /// if any symbol's drift is critical; does not clear a halt on a clean run.
    pub fn reconcile(
        &mut self,
        now: DateTime<Utc>,
        local_positions: &BTreeMap<String, Decimal>,
        broker_positions: &BTreeMap<String, Decimal>,
        risk_state: &mut mqk_risk::RiskState,
    ) -> ReconcileReport {
        let mut drifts = Vec::new();

        for (symbol, &local_qty) in local_positions {
            let broker_qty = broker_positions.get(symbol).copied().unwrap_or(Decimal::ZERO);
            let delta = local_qty - broker_qty;
            if delta.abs() > DRIFT_EPSILON {
                drifts.push(drift_entry(symbol, local_qty, broker_qty, delta));
            }
        }

        for (symbol, &broker_qty) in broker_positions {
            if local_positions.contains_key(symbol) {
                continue;
            }
            if broker_qty.abs() > DRIFT_EPSILON {
                drifts.push(drift_entry(symbol, Decimal::ZERO, broker_qty, -broker_qty));
            }
        }

        let critical = drifts.iter().any(DriftEntry::is_critical);
        if critical {
            let critical_count = drifts.iter().filter(|d| d.is_critical()).count();
            mqk_risk::force_halt(risk_state, format!("Critical position mismatch: {critical_count} positions"));
        }

        let report = ReconcileReport { ts: now, drifts, critical };
        self.last_run = Some(now);
        self.alerts.push_back(report.clone());
        while self.alerts.len() > ALERT_RING_CAPACITY {
            self.alerts.pop_front();
        }
        report
    }

    pub fn alerts(&self) -> impl Iterator<Item = &ReconcileReport> {
        self.alerts.iter()
    }
}

fn drift_entry(symbol: &str, local_qty: Decimal, broker_qty: Decimal, delta: Decimal) -> DriftEntry {
    let denom = broker_qty.abs().max(DRIFT_EPSILON);
    let pct_diff = (delta.abs() / denom) * Decimal::from(100);
    DriftEntry {
        symbol: symbol.to_string(),
        local_qty,
        broker_qty,
        delta,
        pct_diff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, h, 0, 0).unwrap()
    }

    fn risk_state() -> mqk_risk::RiskState {
        mqk_risk::RiskState::new(ts(9).date_naive(), dec!(100_000))
    }

    #[test]
    fn clean_reconcile_reports_no_drift_and_does_not_halt() {
        let mut reconciler = Reconciler::new(60);
        let mut risk = risk_state();
        let local = BTreeMap::from([("AAPL".to_string(), dec!(100))]);
        let broker = BTreeMap::from([("AAPL".to_string(), dec!(100))]);
        let report = reconciler.reconcile(ts(10), &local, &broker, &mut risk);
        assert!(report.drifts.is_empty());
        assert!(!report.critical);
        assert!(!risk.halted);
    }

    #[test]
    fn critical_drift_halts_the_risk_engine() {
        let mut reconciler = Reconciler::new(60);
        let mut risk = risk_state();
        // 100 local vs 50 broker = 100% drift, well above the 10% threshold.
        let local = BTreeMap::from([("AAPL".to_string(), dec!(100))]);
        let broker = BTreeMap::from([("AAPL".to_string(), dec!(50))]);
        let report = reconciler.reconcile(ts(10), &local, &broker, &mut risk);
        assert!(report.critical);
        assert!(risk.halted);
        assert_eq!(risk.halt_reason.as_deref(), Some("Critical position mismatch: 1 positions"));
    }

    #[test]
    fn minor_drift_is_logged_but_does_not_halt() {
        let mut reconciler = Reconciler::new(60);
        let mut risk = risk_state();
        // delta 1 on broker qty 100 = 1% drift, below the 10% threshold.
        let local = BTreeMap::from([("AAPL".to_string(), dec!(101))]);
        let broker = BTreeMap::from([("AAPL".to_string(), dec!(100))]);
        let report = reconciler.reconcile(ts(10), &local, &broker, &mut risk);
        assert_eq!(report.drifts.len(), 1);
        assert!(!report.critical);
        assert!(!risk.halted);
    }

    #[test]
    fn broker_only_position_is_reported_as_full_negative_delta() {
        let mut reconciler = Reconciler::new(60);
        let mut risk = risk_state();
        let local = BTreeMap::new();
        let broker = BTreeMap::from([("MSFT".to_string(), dec!(40))]);
        let report = reconciler.reconcile(ts(10), &local, &broker, &mut risk);
        assert_eq!(report.drifts.len(), 1);
        assert_eq!(report.drifts[0].delta, dec!(-40));
        assert!(report.critical, "broker-only position is a 100% drift");
    }

    #[test]
    fn is_due_gates_on_the_configured_interval() {
        let reconciler = Reconciler::new(60);
        assert!(reconciler.is_due(ts(9)));
    }

    #[test]
    fn is_due_false_before_interval_elapses() {
        let mut reconciler = Reconciler::new(60);
        let mut risk = risk_state();
        reconciler.reconcile(ts(9), &BTreeMap::new(), &BTreeMap::new(), &mut risk);
        assert!(!reconciler.is_due(ts(9) + Duration::minutes(30)));
        assert!(reconciler.is_due(ts(9) + Duration::minutes(61)));
    }

    #[test]
    fn alert_ring_is_bounded() {
        let mut reconciler = Reconciler::new(0);
        let mut risk = risk_state();
        for i in 0..(ALERT_RING_CAPACITY + 10) {
            reconciler.reconcile(ts(9) + Duration::minutes(i as i64), &BTreeMap::new(), &BTreeMap::new(), &mut risk);
        }
        assert_eq!(reconciler.alerts().count(), ALERT_RING_CAPACITY);
    }
}
