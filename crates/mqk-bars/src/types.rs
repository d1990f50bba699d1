use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum BarError {
    #[error("bar invariant violated for {symbol}: low {low} must be <= open/close/high")]
    InvalidRange { symbol: String, low: Decimal },
    #[error("bar invariant violated for {symbol}: prices must be > 0 (low={low})")]
    NonPositivePrice { symbol: String, low: Decimal },
    #[error("bar for {symbol} at {ts} is not strictly monotonic relative to the last bar at {last_ts}")]
    NonMonotonic {
        symbol: String,
        ts: DateTime<Utc>,
        last_ts: DateTime<Utc>,
    },
}

/// A single OHLCV bar. `low <= open,close <= high`, `volume >= 0` are
/// validated at construction so a malformed upstream feed is rejected
/// before it ever reaches the bar history.
#[derive(Clone, Debug, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl Bar {
    pub fn new(
        symbol: impl Into<String>,
        ts: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) -> Result<Self, BarError> {
        let symbol = symbol.into();
        if low <= Decimal::ZERO || open <= Decimal::ZERO || high <= Decimal::ZERO || close <= Decimal::ZERO {
            return Err(BarError::NonPositivePrice { symbol, low });
        }
        if low > open || low > close || low > high || high < low {
            return Err(BarError::InvalidRange { symbol, low });
        }
        Ok(Self {
            symbol,
            ts,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}
