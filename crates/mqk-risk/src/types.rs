use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Risk configuration: every threshold a pre-trade check is evaluated against.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskConfig {
    /// Per-symbol cap on `|q_after| * fp` (check 2).
    pub per_symbol_notional_cap: Decimal,
    /// Cap on `|q_after| * fp` as a fraction of equity (check 3).
    pub max_position_fraction: Decimal,
    /// Cap on `|q_after|` in units, regardless of price (check 4).
    pub max_single_position_units: Decimal,
    /// Max orders accepted in any trailing 60s window (check 5).
    pub max_orders_per_minute: u32,
    /// Max orders accepted in a trading day (check 5).
    pub max_orders_per_day: u32,
    /// Fraction of start-of-day equity that, if lost, halts trading (check 6).
    pub max_daily_loss: Decimal,
    /// Fraction of peak equity that, if drawn down, halts trading (check 7).
    pub max_drawdown: Decimal,
}

impl RiskConfig {
    pub fn sane_defaults() -> Self {
        Self {
            per_symbol_notional_cap: Decimal::new(50_000, 0),
            max_position_fraction: Decimal::new(25, 2), // 0.25
            max_single_position_units: Decimal::new(10_000, 0),
            max_orders_per_minute: 30,
            max_orders_per_day: 500,
            max_daily_loss: Decimal::new(3, 2), // 0.03
            max_drawdown: Decimal::new(10, 2),  // 0.10
        }
    }
}

/// Reason a pre-trade check rejected a proposed order, or a post-facto
/// guard forced a halt. Carries the evidence needed to log without
/// re-deriving it from state.
#[derive(Clone, Debug, PartialEq)]
pub enum RiskViolation {
    AlreadyHalted,
    PerSymbolNotionalCapExceeded { proposed: Decimal, cap: Decimal },
    PositionFractionExceeded { proposed: Decimal, cap: Decimal },
    SinglePositionUnitsExceeded { proposed: Decimal, cap: Decimal },
    OrderRateLimitedPerMinute { count: u32, cap: u32 },
    OrderRateLimitedPerDay { count: u32, cap: u32 },
    DailyLossLimitBreached { daily_pnl: Decimal, floor: Decimal },
    DrawdownLimitBreached { equity: Decimal, floor: Decimal },
    /// Negative equity, non-finite price, zero/negative quantity — values
    /// that cannot occur in a well-formed system and are rejected rather
    /// than risk corrupting running state.
    BadInput(String),
}

impl std::fmt::Display for RiskViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskViolation::AlreadyHalted => write!(f, "risk engine is halted"),
            RiskViolation::PerSymbolNotionalCapExceeded { proposed, cap } => {
                write!(f, "per-symbol notional cap exceeded: {proposed} > {cap}")
            }
            RiskViolation::PositionFractionExceeded { proposed, cap } => {
                write!(f, "position fraction of equity exceeded: {proposed} > {cap}")
            }
            RiskViolation::SinglePositionUnitsExceeded { proposed, cap } => {
                write!(f, "single position unit cap exceeded: {proposed} > {cap}")
            }
            RiskViolation::OrderRateLimitedPerMinute { count, cap } => {
                write!(f, "order rate limit exceeded: {count} orders in last 60s (cap {cap})")
            }
            RiskViolation::OrderRateLimitedPerDay { count, cap } => {
                write!(f, "daily order count exceeded: {count} (cap {cap})")
            }
            RiskViolation::DailyLossLimitBreached { daily_pnl, floor } => {
                write!(f, "daily loss limit breached: daily_pnl {daily_pnl} <= floor {floor}")
            }
            RiskViolation::DrawdownLimitBreached { equity, floor } => {
                write!(f, "drawdown limit breached: equity {equity} <= floor {floor}")
            }
            RiskViolation::BadInput(msg) => write!(f, "bad input to risk engine: {msg}"),
        }
    }
}

impl std::error::Error for RiskViolation {}

/// Mutable risk-engine state carried across pre-trade checks, fills, and
/// day rollovers.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskState {
    pub halted: bool,
    /// Stable structured key for the halt cause, surfaced in logs and the
    /// checkpoint snapshot. `None` whenever `halted` is false.
    pub halt_reason: Option<String>,
    pub current_day: NaiveDate,
    pub start_of_day_equity: Decimal,
    pub daily_pnl: Decimal,
    pub peak_equity: Decimal,
    pub order_timestamps: VecDeque<DateTime<Utc>>,
    pub daily_order_count: u32,
}

impl RiskState {
    pub fn new(current_day: NaiveDate, equity: Decimal) -> Self {
        Self {
            halted: false,
            halt_reason: None,
            current_day,
            start_of_day_equity: equity,
            daily_pnl: Decimal::ZERO,
            peak_equity: equity,
            order_timestamps: VecDeque::new(),
            daily_order_count: 0,
        }
    }
}
