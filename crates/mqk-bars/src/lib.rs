//! Per-symbol bounded bar history and a shared last-price table.
//!
//! Both structures live behind a single mutex (generalized from the
//! bounded, tail-truncating `RecentBarsWindow` idiom): fast readers copy out
//! the slice or map they need and release the lock immediately rather than
//! holding it across decision-engine evaluation.

mod types;

pub use types::{Bar, BarError};

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use rust_decimal::Decimal;

struct Inner {
    warmup_bars: usize,
    history: BTreeMap<String, VecDeque<Bar>>,
    last_prices: BTreeMap<String, Decimal>,
}

impl Inner {
    fn capacity(&self) -> usize {
        self.warmup_bars * 5
    }
}

/// Thread-safe bar history plus last-price table for all tracked symbols.
pub struct BarProcessor {
    inner: Mutex<Inner>,
}

impl BarProcessor {
    pub fn new(warmup_bars: usize) -> Self {
        debug_assert!(warmup_bars > 0);
        Self {
            inner: Mutex::new(Inner {
                warmup_bars,
                history: BTreeMap::new(),
                last_prices: BTreeMap::new(),
            }),
        }
    }

    /// Append a bar for its symbol, discarding duplicates and enforcing
    /// strict ts monotonicity within that symbol's stream. Also updates
    /// `last_prices[symbol]` to the bar's close.
    pub fn process_bar(&self, bar: Bar) -> Result<(), BarError> {
        let mut inner = self.inner.lock().expect("bar processor mutex poisoned");
        let capacity = inner.capacity();
        let deque = inner.history.entry(bar.symbol.clone()).or_default();

        if let Some(last) = deque.back() {
            if bar.ts == last.ts {
                // Duplicate bar for an already-seen timestamp: discard silently.
                return Ok(());
            }
            if bar.ts < last.ts {
                return Err(BarError::NonMonotonic {
                    symbol: bar.symbol.clone(),
                    ts: bar.ts,
                    last_ts: last.ts,
                });
            }
        }

        let close = bar.close;
        let symbol = bar.symbol.clone();
        deque.push_back(bar);
        while deque.len() > capacity {
            deque.pop_front();
        }

        inner.last_prices.insert(symbol, close);
        Ok(())
    }

    /// Update the last-price table directly. Safe to call from the
    /// fill-handler thread, independent of bar arrival.
    pub fn update_price(&self, symbol: &str, price: Decimal) {
        let mut inner = self.inner.lock().expect("bar processor mutex poisoned");
        inner.last_prices.insert(symbol.to_string(), price);
    }

    /// Snapshot of the recent bars for one symbol, oldest first.
    pub fn recent_bars(&self, symbol: &str) -> Vec<Bar> {
        let inner = self.inner.lock().expect("bar processor mutex poisoned");
        inner
            .history
            .get(symbol)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        let inner = self.inner.lock().expect("bar processor mutex poisoned");
        inner.last_prices.get(symbol).copied()
    }

    /// Snapshot of every tracked symbol's last price.
    pub fn last_prices(&self) -> BTreeMap<String, Decimal> {
        let inner = self.inner.lock().expect("bar processor mutex poisoned");
        inner.last_prices.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn bar(symbol: &str, ts_offset_secs: i64, close: Decimal) -> Bar {
        let ts = Utc.with_ymd_and_hms(2026, 1, 5, 14, 30, 0).unwrap() + Duration::seconds(ts_offset_secs);
        Bar::new(symbol, ts, close, close, close, close, 100).unwrap()
    }

    #[test]
    fn invalid_range_is_rejected_at_construction() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 5, 14, 30, 0).unwrap();
        let err = Bar::new("AAPL", ts, dec!(10), dec!(9), dec!(11), dec!(10), 10);
        assert!(err.is_err());
    }

    #[test]
    fn zero_price_bar_is_rejected() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 5, 14, 30, 0).unwrap();
        let err = Bar::new("AAPL", ts, dec!(0), dec!(0), dec!(0), dec!(0), 10);
        assert!(matches!(err, Err(BarError::NonPositivePrice { .. })));
    }

    #[test]
    fn history_is_bounded_to_five_times_warmup() {
        let proc = BarProcessor::new(2); // capacity = 10
        for i in 0..20i64 {
            proc.process_bar(bar("AAPL", i, dec!(100) + Decimal::from(i))).unwrap();
        }
        let recent = proc.recent_bars("AAPL");
        assert_eq!(recent.len(), 10);
        assert_eq!(recent.first().unwrap().close, dec!(110));
        assert_eq!(recent.last().unwrap().close, dec!(119));
    }

    #[test]
    fn duplicate_timestamp_is_discarded() {
        let proc = BarProcessor::new(5);
        proc.process_bar(bar("AAPL", 0, dec!(100))).unwrap();
        proc.process_bar(bar("AAPL", 0, dec!(999))).unwrap();
        let recent = proc.recent_bars("AAPL");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].close, dec!(100));
    }

    #[test]
    fn non_monotonic_bar_is_rejected() {
        let proc = BarProcessor::new(5);
        proc.process_bar(bar("AAPL", 10, dec!(100))).unwrap();
        let err = proc.process_bar(bar("AAPL", 5, dec!(101)));
        assert!(err.is_err());
    }

    #[test]
    fn process_bar_updates_last_price() {
        let proc = BarProcessor::new(5);
        proc.process_bar(bar("AAPL", 0, dec!(150))).unwrap();
        assert_eq!(proc.last_price("AAPL"), Some(dec!(150)));
    }

    #[test]
    fn update_price_is_independent_of_bar_arrival() {
        let proc = BarProcessor::new(5);
        proc.update_price("AAPL", dec!(151.23));
        assert_eq!(proc.last_price("AAPL"), Some(dec!(151.23)));
        assert!(proc.recent_bars("AAPL").is_empty());
    }
}
