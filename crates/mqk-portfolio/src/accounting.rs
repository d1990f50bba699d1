//! Weighted-average cost-basis accounting.
//!
//! This is the single most correctness-critical piece of the core: realized
//! P&L on a reducing or reversing fill must be computed against the
//! position's *entry* price, never its notional value. See `apply_fill` for
//! the exact cost-basis-crossing algorithm.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::types::{CashEntry, Fill, LedgerEntry, PortfolioState, Position};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum EquityError {
    #[error("missing price for open position in {0}")]
    MissingPrice(String),
}

/// Apply a single fill to the portfolio, returning the realized P&L (zero if
/// the fill only opens or adds to a position).
///
/// Let `q` = existing signed quantity, `p` = existing average price, `dq` =
/// the fill's signed quantity, `fp` = the fill price.
///
/// - `q == 0`: new position. `q <- dq`, `p <- fp`, realized = 0.
/// - `sign(q) == sign(dq)`: adding. Weighted average
///   `p <- (|q|*p + |dq|*fp) / (|q| + |dq|)`; `q <- q + dq`; realized = 0.
/// - opposing signs (reduce / close / reverse):
///   - `closing_qty = min(|dq|, |q|)`.
///   - realized (for the closing leg) = `(fp - p) * closing_qty` if `q > 0`,
///     else `(p - fp) * closing_qty`.
///   - `|dq| <= |q|` (pure reduce/close): `q <- q + dq`; `p` unchanged.
///   - `|dq| > |q|` (reversal): `q` fully closes at `p`; the remainder
///     `dq' = dq + q` opens the opposite side at `fp`: `q <- dq'`, `p <- fp`.
pub fn apply_fill(state: &mut PortfolioState, fill: Fill) -> Decimal {
    let symbol = fill.symbol.clone();
    let entry = state
        .positions
        .entry(symbol.clone())
        .or_insert_with(|| Position::flat(symbol.clone(), fill.ts));

    let q = entry.quantity;
    let p = entry.average_price;
    let dq = fill.signed_qty;
    let fp = fill.price;

    let realized = if q.is_zero() {
        entry.quantity = dq;
        entry.average_price = fp;
        Decimal::ZERO
    } else if q.signum() == dq.signum() {
        let abs_q = q.abs();
        let abs_dq = dq.abs();
        let denom = abs_q + abs_dq;
        entry.average_price = if denom.is_zero() {
            p
        } else {
            (abs_q * p + abs_dq * fp) / denom
        };
        entry.quantity = q + dq;
        Decimal::ZERO
    } else {
        let closing_qty = dq.abs().min(q.abs());
        let leg_realized = if q > Decimal::ZERO {
            (fp - p) * closing_qty
        } else {
            (p - fp) * closing_qty
        };

        if dq.abs() <= q.abs() {
            entry.quantity = q + dq;
            // average_price is left unchanged; it must not be read while flat.
        } else {
            let remainder = dq + q;
            entry.quantity = remainder;
            entry.average_price = fp;
        }
        leg_realized
    };

    entry.last_update = fill.ts;

    state.cash -= dq * fp + fill.commission;
    state.realized_pnl += realized;
    state.ledger.push(LedgerEntry::Fill(fill));
    realized
}

/// Apply a pure cash movement (no position effect).
pub fn apply_cash(state: &mut PortfolioState, entry: CashEntry) {
    state.cash += entry.amount;
    state.ledger.push(LedgerEntry::Cash(entry));
}

/// Dispatch a generic ledger entry. Used by `recompute_from_ledger` so the
/// replay path and the live path share one switch.
fn apply_entry_no_record(state: &mut PortfolioState, entry: &LedgerEntry) {
    match entry.clone() {
        LedgerEntry::Fill(fill) => {
            // Re-run the same math as apply_fill but without re-appending to
            // the ledger (the ledger already holds this entry during replay).
            let symbol = fill.symbol.clone();
            let pos = state
                .positions
                .entry(symbol.clone())
                .or_insert_with(|| Position::flat(symbol.clone(), fill.ts));
            let q = pos.quantity;
            let p = pos.average_price;
            let dq = fill.signed_qty;
            let fp = fill.price;

            let realized = if q.is_zero() {
                pos.quantity = dq;
                pos.average_price = fp;
                Decimal::ZERO
            } else if q.signum() == dq.signum() {
                let abs_q = q.abs();
                let abs_dq = dq.abs();
                let denom = abs_q + abs_dq;
                pos.average_price = if denom.is_zero() {
                    p
                } else {
                    (abs_q * p + abs_dq * fp) / denom
                };
                pos.quantity = q + dq;
                Decimal::ZERO
            } else {
                let closing_qty = dq.abs().min(q.abs());
                let leg_realized = if q > Decimal::ZERO {
                    (fp - p) * closing_qty
                } else {
                    (p - fp) * closing_qty
                };
                if dq.abs() <= q.abs() {
                    pos.quantity = q + dq;
                } else {
                    let remainder = dq + q;
                    pos.quantity = remainder;
                    pos.average_price = fp;
                }
                leg_realized
            };
            pos.last_update = fill.ts;
            state.cash -= dq * fp + fill.commission;
            state.realized_pnl += realized;
        }
        LedgerEntry::Cash(cash) => {
            state.cash += cash.amount;
        }
    }
}

/// Replay the entire ledger from scratch and return the resulting state.
/// Used as a determinism check: `recompute_from_ledger(&state)` must equal
/// `state` after any sequence of incremental `apply_fill`/`apply_cash` calls.
pub fn recompute_from_ledger(state: &PortfolioState) -> PortfolioState {
    let mut fresh = PortfolioState::new(state.initial_cash);
    for entry in &state.ledger {
        apply_entry_no_record(&mut fresh, entry);
        fresh.ledger.push(entry.clone());
    }
    fresh
}

/// Total equity: cash plus the mark-to-market value of every non-flat
/// position. Fails loudly (rather than silently skipping) if a non-flat
/// position's symbol is missing from `prices` — a silent skip would create
/// phantom equity drift after a reconciliation gap.
pub fn equity(state: &PortfolioState, prices: &BTreeMap<String, Decimal>) -> Result<Decimal, EquityError> {
    let mut total = state.cash;
    for pos in state.positions.values() {
        if pos.is_flat() {
            continue;
        }
        let price = prices
            .get(&pos.symbol)
            .ok_or_else(|| EquityError::MissingPrice(pos.symbol.clone()))?;
        total += pos.quantity * *price;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn ts() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 14, 30, 0).unwrap()
    }

    fn fill(symbol: &str, signed_qty: Decimal, price: Decimal) -> Fill {
        Fill::new(symbol, signed_qty, price, Decimal::ZERO, ts())
    }

    #[test]
    fn long_round_trip() {
        let mut state = PortfolioState::new(dec!(100_000));
        apply_fill(&mut state, fill("AAPL", dec!(100), dec!(50)));
        let realized = apply_fill(&mut state, fill("AAPL", dec!(-100), dec!(60)));
        assert_eq!(realized, dec!(1000));
        assert_eq!(state.cash, dec!(101_000));
        assert!(state.positions["AAPL"].is_flat());
    }

    #[test]
    fn short_round_trip_loss() {
        let mut state = PortfolioState::new(dec!(100_000));
        apply_fill(&mut state, fill("AAPL", dec!(-100), dec!(50)));
        let realized = apply_fill(&mut state, fill("AAPL", dec!(100), dec!(60)));
        assert_eq!(realized, dec!(-1000));
    }

    #[test]
    fn weighted_average_add_then_close() {
        let mut state = PortfolioState::new(dec!(100_000));
        apply_fill(&mut state, fill("AAPL", dec!(100), dec!(50)));
        apply_fill(&mut state, fill("AAPL", dec!(100), dec!(60)));
        assert_eq!(state.positions["AAPL"].average_price, dec!(55));
        let realized = apply_fill(&mut state, fill("AAPL", dec!(-200), dec!(65)));
        assert_eq!(realized, dec!(2000));
    }

    #[test]
    fn reversal_closes_then_opens_opposite() {
        let mut state = PortfolioState::new(dec!(100_000));
        apply_fill(&mut state, fill("AAPL", dec!(100), dec!(100)));
        let realized = apply_fill(&mut state, fill("AAPL", dec!(-300), dec!(110)));
        assert_eq!(realized, dec!(1000));
        let pos = &state.positions["AAPL"];
        assert_eq!(pos.quantity, dec!(-200));
        assert_eq!(pos.average_price, dec!(110));
    }

    #[test]
    fn apply_fill_then_inverse_leaves_cash_unchanged() {
        let mut state = PortfolioState::new(dec!(100_000));
        apply_fill(&mut state, fill("AAPL", dec!(50), dec!(70)));
        apply_fill(&mut state, fill("AAPL", dec!(-50), dec!(70)));
        assert_eq!(state.cash, dec!(100_000));
        assert!(state.positions["AAPL"].is_flat());
    }

    #[test]
    fn recompute_from_ledger_matches_incremental() {
        let mut state = PortfolioState::new(dec!(50_000));
        apply_fill(&mut state, fill("MSFT", dec!(10), dec!(300)));
        apply_fill(&mut state, fill("MSFT", dec!(10), dec!(310)));
        apply_fill(&mut state, fill("MSFT", dec!(-25), dec!(320)));
        let replayed = recompute_from_ledger(&state);
        assert_eq!(replayed.cash, state.cash);
        assert_eq!(replayed.realized_pnl, state.realized_pnl);
        assert_eq!(replayed.positions, state.positions);
    }

    #[test]
    fn equity_errors_on_missing_price_for_open_position() {
        let mut state = PortfolioState::new(dec!(10_000));
        apply_fill(&mut state, fill("AAPL", dec!(10), dec!(100)));
        let prices = BTreeMap::new();
        let err = equity(&state, &prices).unwrap_err();
        assert_eq!(err, EquityError::MissingPrice("AAPL".to_string()));
    }

    #[test]
    fn equity_ignores_flat_positions_without_a_price() {
        let mut state = PortfolioState::new(dec!(10_000));
        apply_fill(&mut state, fill("AAPL", dec!(10), dec!(100)));
        apply_fill(&mut state, fill("AAPL", dec!(-10), dec!(105)));
        let prices = BTreeMap::new();
        assert_eq!(equity(&state, &prices).unwrap(), state.cash);
    }

    #[test]
    fn extreme_price_move_realized_exact() {
        let mut state = PortfolioState::new(dec!(1_000_000));
        apply_fill(&mut state, fill("BTC", dec!(1), dec!(100)));
        let realized = apply_fill(&mut state, fill("BTC", dec!(-1), dec!(10_000)));
        assert_eq!(realized, dec!(9900));
    }

    #[test]
    fn fractional_quantities_use_full_precision() {
        let mut state = PortfolioState::new(dec!(100_000));
        apply_fill(&mut state, fill("BTC", dec!(0.5), dec!(60_000)));
        apply_fill(&mut state, fill("BTC", dec!(0.25), dec!(62_000)));
        // weighted average = (0.5*60000 + 0.25*62000) / 0.75
        let avg = state.positions["BTC"].average_price;
        assert_eq!(avg.round_dp(4), dec!(60_666.6667));
    }
}
