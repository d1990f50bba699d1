//! Pre-trade risk checks, daily counters, and the sticky halt flag.
//!
//! Deterministic, pure logic: no IO, no broker calls. The caller supplies
//! `equity`/`now` and owns persistence of `RiskState`.

mod engine;
mod types;

pub use engine::{
    check_pre_trade, clear_halt, force_halt, record_order_submission, register_trade, roll_day_if_needed,
};
pub use types::{RiskConfig, RiskState, RiskViolation};
