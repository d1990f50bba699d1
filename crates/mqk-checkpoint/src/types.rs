use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// On-disk shape of one position, per spec §6's checkpoint file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub qty: Decimal,
    pub avg_price: Decimal,
    pub last_update: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: Decimal,
    pub positions: Vec<PositionSnapshot>,
}

impl From<&mqk_portfolio::PortfolioState> for PortfolioSnapshot {
    fn from(state: &mqk_portfolio::PortfolioState) -> Self {
        Self {
            cash: state.cash,
            positions: state
                .positions
                .values()
                .map(|p| PositionSnapshot {
                    symbol: p.symbol.clone(),
                    qty: p.quantity,
                    avg_price: p.average_price,
                    last_update: p.last_update,
                })
                .collect(),
        }
    }
}

impl PortfolioSnapshot {
    /// Rebuild a `PortfolioState` from a loaded snapshot. The replayable
    /// ledger is not part of the checkpoint format (spec §6) and starts
    /// empty; this is a restored live state, not a replay source.
    pub fn restore(&self) -> mqk_portfolio::PortfolioState {
        let mut state = mqk_portfolio::PortfolioState::new(self.cash);
        state.cash = self.cash;
        for pos in &self.positions {
            state.positions.insert(
                pos.symbol.clone(),
                mqk_portfolio::Position {
                    symbol: pos.symbol.clone(),
                    quantity: pos.qty,
                    average_price: pos.avg_price,
                    last_update: pos.last_update,
                },
            );
        }
        state
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub daily_pnl: Decimal,
    pub peak_equity: Decimal,
    pub start_of_day_equity: Decimal,
    pub last_reset_date: NaiveDate,
    pub halted: bool,
    pub halt_reason: Option<String>,
    pub daily_order_count: u32,
    pub order_timestamps: Vec<DateTime<Utc>>,
}

impl From<&mqk_risk::RiskState> for RiskSnapshot {
    fn from(state: &mqk_risk::RiskState) -> Self {
        Self {
            daily_pnl: state.daily_pnl,
            peak_equity: state.peak_equity,
            start_of_day_equity: state.start_of_day_equity,
            last_reset_date: state.current_day,
            halted: state.halted,
            halt_reason: state.halt_reason.clone(),
            daily_order_count: state.daily_order_count,
            order_timestamps: state.order_timestamps.iter().copied().collect(),
        }
    }
}

impl RiskSnapshot {
    pub fn restore(&self) -> mqk_risk::RiskState {
        mqk_risk::RiskState {
            halted: self.halted,
            halt_reason: self.halt_reason.clone(),
            current_day: self.last_reset_date,
            start_of_day_equity: self.start_of_day_equity,
            daily_pnl: self.daily_pnl,
            peak_equity: self.peak_equity,
            order_timestamps: self.order_timestamps.iter().copied().collect(),
            daily_order_count: self.daily_order_count,
        }
    }
}

/// The full checkpoint file contents (spec §6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    pub portfolio: PortfolioSnapshot,
    pub risk: RiskSnapshot,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
