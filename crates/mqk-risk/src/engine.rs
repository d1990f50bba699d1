use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::types::{RiskConfig, RiskState, RiskViolation};

/// Day rollover: recompute `start_of_day_equity`, zero `daily_pnl`, truncate
/// `order_timestamps` to the trailing 60s window, reset `daily_order_count`.
/// Does not touch `halted` — a halt persists across the day boundary until
/// explicitly cleared by the coordinator.
pub fn roll_day_if_needed(state: &mut RiskState, today: chrono::NaiveDate, now: DateTime<Utc>, equity: Decimal) {
    if today == state.current_day {
        return;
    }
    state.current_day = today;
    state.start_of_day_equity = equity;
    state.daily_pnl = Decimal::ZERO;
    state.daily_order_count = 0;
    prune_order_timestamps(state, now);
}

fn prune_order_timestamps(state: &mut RiskState, now: DateTime<Utc>) {
    let cutoff = now - Duration::seconds(60);
    while matches!(state.order_timestamps.front(), Some(ts) if *ts < cutoff) {
        state.order_timestamps.pop_front();
    }
}

/// Pre-trade checks 1-7 from the risk section, evaluated in order against a
/// proposed fill of `q_after` (post-fill signed position size) at price `fp`.
#[allow(clippy::too_many_arguments)]
pub fn check_pre_trade(
    cfg: &RiskConfig,
    state: &mut RiskState,
    q_after: Decimal,
    fp: Decimal,
    equity: Decimal,
    now: DateTime<Utc>,
) -> Result<(), RiskViolation> {
    if equity < Decimal::ZERO {
        return Err(RiskViolation::BadInput(format!("negative equity: {equity}")));
    }
    if fp <= Decimal::ZERO {
        return Err(RiskViolation::BadInput(format!("non-positive price: {fp}")));
    }

    // 1. halted => reject.
    if state.halted {
        return Err(RiskViolation::AlreadyHalted);
    }

    let proposed_notional = q_after.abs() * fp;

    // 2. per-symbol notional cap.
    if proposed_notional > cfg.per_symbol_notional_cap {
        return Err(RiskViolation::PerSymbolNotionalCapExceeded {
            proposed: proposed_notional,
            cap: cfg.per_symbol_notional_cap,
        });
    }

    // 3. position fraction of equity.
    let fraction_cap_notional = cfg.max_position_fraction * equity;
    if proposed_notional > fraction_cap_notional {
        return Err(RiskViolation::PositionFractionExceeded {
            proposed: proposed_notional,
            cap: fraction_cap_notional,
        });
    }

    // 4. single position unit cap.
    if q_after.abs() > cfg.max_single_position_units {
        return Err(RiskViolation::SinglePositionUnitsExceeded {
            proposed: q_after.abs(),
            cap: cfg.max_single_position_units,
        });
    }

    // 5. order-rate limits.
    prune_order_timestamps(state, now);
    let count_last_minute = state.order_timestamps.len() as u32;
    if count_last_minute >= cfg.max_orders_per_minute {
        return Err(RiskViolation::OrderRateLimitedPerMinute {
            count: count_last_minute,
            cap: cfg.max_orders_per_minute,
        });
    }
    if state.daily_order_count >= cfg.max_orders_per_day {
        return Err(RiskViolation::OrderRateLimitedPerDay {
            count: state.daily_order_count,
            cap: cfg.max_orders_per_day,
        });
    }

    // 6. daily loss guard.
    let daily_loss_floor = -(cfg.max_daily_loss * state.start_of_day_equity);
    if state.daily_pnl <= daily_loss_floor {
        state.halted = true;
        state.halt_reason = Some("daily_loss_limit_breached".to_string());
        return Err(RiskViolation::DailyLossLimitBreached {
            daily_pnl: state.daily_pnl,
            floor: daily_loss_floor,
        });
    }

    // 7. drawdown guard.
    let drawdown_floor = (Decimal::ONE - cfg.max_drawdown) * state.peak_equity;
    if equity <= drawdown_floor {
        state.halted = true;
        state.halt_reason = Some("drawdown_limit_breached".to_string());
        return Err(RiskViolation::DrawdownLimitBreached { equity, floor: drawdown_floor });
    }

    Ok(())
}

/// Update running P&L and peak equity after a fill, then re-check the
/// daily-loss/drawdown guards so a loss realized mid-session can halt
/// trading without waiting for the next pre-trade check.
pub fn register_trade(
    cfg: &RiskConfig,
    state: &mut RiskState,
    realized: Decimal,
    commission: Decimal,
    equity: Decimal,
) {
    state.daily_pnl += realized - commission;
    if equity > state.peak_equity {
        state.peak_equity = equity;
    }

    let daily_loss_floor = -(cfg.max_daily_loss * state.start_of_day_equity);
    if state.daily_pnl <= daily_loss_floor {
        state.halted = true;
        state.halt_reason = Some("daily_loss_limit_breached".to_string());
    }
    let drawdown_floor = (Decimal::ONE - cfg.max_drawdown) * state.peak_equity;
    if equity <= drawdown_floor {
        state.halted = true;
        state.halt_reason = Some("drawdown_limit_breached".to_string());
    }
}

/// Record that the broker has accepted a submission. Must be called only
/// after a successful `broker.submit()` — never before — so a broker
/// outage (submissions failing) cannot exhaust the rate limit against
/// orders that never actually reached the market.
pub fn record_order_submission(state: &mut RiskState, wallclock_ts: DateTime<Utc>) {
    state.order_timestamps.push_back(wallclock_ts);
    state.daily_order_count = state.daily_order_count.saturating_add(1);
}

/// Force a halt for a cause external to the seven pre-trade checks (e.g. a
/// critical position-reconciliation mismatch). Idempotent: does not
/// overwrite an existing reason with a second forced halt.
pub fn force_halt(state: &mut RiskState, reason: impl Into<String>) {
    if state.halted {
        return;
    }
    state.halted = true;
    state.halt_reason = Some(reason.into());
}

/// Clear a halt. Not invoked by any in-scope automatic path — a human
/// operator (or a separate tool) must resume trading deliberately.
pub fn clear_halt(state: &mut RiskState) {
    state.halted = false;
    state.halt_reason = None;
}
