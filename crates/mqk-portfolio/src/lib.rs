//! Cost-basis and position accounting for the trading core.
//!
//! A single weighted-average `Position` per symbol, an append-only ledger for
//! deterministic replay, and an `equity()` mark-to-market that refuses to
//! silently skip a priceless open position.

mod accounting;
mod types;

pub use accounting::{apply_cash, apply_fill, equity, recompute_from_ledger, EquityError};
pub use types::{CashEntry, Fill, LedgerEntry, PortfolioState, Position, Side};
