use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Order side, used only to sign a fill's quantity at the call site.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

/// A single fill to apply to the portfolio. `signed_qty` is already
/// sign-adjusted by side (positive = buy, negative = sell).
#[derive(Clone, Debug, PartialEq)]
pub struct Fill {
    pub symbol: String,
    pub signed_qty: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub ts: DateTime<Utc>,
}

impl Fill {
    pub fn new(
        symbol: impl Into<String>,
        signed_qty: Decimal,
        price: Decimal,
        commission: Decimal,
        ts: DateTime<Utc>,
    ) -> Self {
        debug_assert!(signed_qty != Decimal::ZERO, "fill quantity must be non-zero");
        debug_assert!(price > Decimal::ZERO, "fill price must be positive");
        Self {
            symbol: symbol.into(),
            signed_qty,
            price,
            commission,
            ts,
        }
    }
}

/// A cash-only ledger movement (e.g. a commission adjustment or a deposit),
/// kept distinct from fills so the ledger can represent non-trade cash events.
#[derive(Clone, Debug, PartialEq)]
pub struct CashEntry {
    pub amount: Decimal,
    pub ts: DateTime<Utc>,
}

/// Append-only record of everything that has mutated the portfolio, used for
/// the `recompute_from_ledger` determinism check: replaying the ledger from
/// scratch must reproduce exactly the state produced by incremental
/// `apply_entry` calls.
#[derive(Clone, Debug, PartialEq)]
pub enum LedgerEntry {
    Fill(Fill),
    Cash(CashEntry),
}

/// A position in one symbol. `quantity > 0` is long, `< 0` is short, `== 0`
/// is flat. Flat positions are retained (not removed from the map) for
/// historical continuity but are ignored by exposure/equity math and must
/// not require a price in `equity()`.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub last_update: DateTime<Utc>,
}

impl Position {
    pub fn flat(symbol: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            last_update: at,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == Decimal::ZERO
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }
}

/// The portfolio: cash plus every symbol ever traded. `positions` uses a
/// `BTreeMap` so snapshots and checkpoint serialization are deterministically
/// ordered.
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioState {
    pub initial_cash: Decimal,
    pub cash: Decimal,
    pub realized_pnl: Decimal,
    pub positions: std::collections::BTreeMap<String, Position>,
    pub ledger: Vec<LedgerEntry>,
}

impl PortfolioState {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            realized_pnl: Decimal::ZERO,
            positions: std::collections::BTreeMap::new(),
            ledger: Vec::new(),
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }
}
