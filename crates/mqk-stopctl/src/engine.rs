use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::America::New_York;
use rust_decimal::Decimal;

use mqk_execution::{BrokerAdapter, OrderKind, OrderRequest, Side, TimeInForce};
use mqk_portfolio::PortfolioState;

use crate::calendar::MarketCalendar;
use crate::types::{ShutdownOutcome, ShutdownStatus, StopConfig};

const FLAT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01
const MAX_RETRY_ROUNDS: u32 = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Manual-stop flag plus end-of-day flatten scheduling (spec §4.J). The
/// graceful-shutdown sequence lives on this type too since it needs no
/// state beyond the config and the stop reason already held here.
pub struct StopController {
    config: StopConfig,
    stop_requested: AtomicBool,
    stop_reason: Mutex<Option<String>>,
    eod_flatten_executed: AtomicBool,
}

impl StopController {
    pub fn new(config: StopConfig) -> Self {
        Self {
            config,
            stop_requested: AtomicBool::new(false),
            stop_reason: Mutex::new(None),
            eod_flatten_executed: AtomicBool::new(false),
        }
    }

    /// Requests a stop. Only `reason == "manual"` is dropped when
    /// `enable_manual_stop` is false; every other reason (including
    /// `"end_of_day_flatten"`) is always honored.
    pub fn request_stop(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.config.enable_manual_stop && reason == "manual" {
            tracing::info!(reason = %reason, "manual stop ignored (disabled)");
            return;
        }
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            tracing::warn!(reason = %reason, "stop requested");
            *self.stop_reason.lock().unwrap() = Some(reason);
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn stop_reason(&self) -> Option<String> {
        self.stop_reason.lock().unwrap().clone()
    }

    /// Resets the once-per-day EOD flatten latch. Call on day rollover.
    pub fn reset_eod_flatten(&self) {
        self.eod_flatten_executed.store(false, Ordering::SeqCst);
    }

    /// Checks whether the configured EOD flatten instant has been reached.
    /// Reprojects the configured offset-before-close onto the day's actual
    /// close (so early closes still flatten the right number of minutes
    /// before the bell), converting through the IANA tz database so DST
    /// transitions are handled correctly.
    pub fn check_eod_flatten(&self, now: DateTime<Utc>, calendar: &dyn MarketCalendar) -> bool {
        if !self.config.enable_eod_flatten {
            return false;
        }
        if self.eod_flatten_executed.load(Ordering::SeqCst) {
            return false;
        }

        let date = now.with_timezone(&New_York).date_naive();
        let actual_close = calendar.actual_close(date);
        let flatten_instant_utc = effective_flatten_instant_utc(
            date,
            actual_close,
            self.config.eod_flatten_time_et,
        );

        if now >= flatten_instant_utc {
            self.eod_flatten_executed.store(true, Ordering::SeqCst);
            tracing::info!(target_et = %self.config.eod_flatten_time_et, "EOD flatten triggered");
            true
        } else {
            false
        }
    }

    /// Graceful shutdown sequence (spec §4.J steps 1-5): cancel everything
    /// working, submit opposing market orders for every non-flat position,
    /// poll for fills, and retry up to `MAX_RETRY_ROUNDS` times.
    pub async fn execute_graceful_shutdown(
        &self,
        broker: &dyn BrokerAdapter,
        portfolio: &Mutex<PortfolioState>,
    ) -> ShutdownStatus {
        tracing::warn!("executing graceful shutdown sequence");
        let start = Instant::now();

        let orders_cancelled = match broker.cancel_all().await {
            Ok(n) => n,
            Err(err) => {
                tracing::error!(error = %err, "failed to cancel orders during shutdown");
                0
            }
        };

        let mut fully_closed: Vec<String> = Vec::new();
        let submitted_initially = submit_liquidation_orders(broker, portfolio).await;
        let mut retry_count = 0u32;

        for round in 0..MAX_RETRY_ROUNDS {
            retry_count = round;
            let closed_this_round =
                monitor_fills(portfolio, self.config.emergency_liquidation_timeout).await;
            fully_closed.extend(closed_this_round);

            let remaining = open_positions(portfolio);
            if remaining.is_empty() {
                break;
            }

            tracing::warn!(remaining = ?remaining.keys().collect::<Vec<_>>(), "positions still open");
            if round < MAX_RETRY_ROUNDS - 1 {
                submit_liquidation_orders(broker, portfolio).await;
            }
        }

        let final_remaining = open_positions(portfolio);
        let total_wait_time = start.elapsed();

        let outcome = if final_remaining.is_empty() {
            ShutdownOutcome::Success
        } else if final_remaining.len() < submitted_initially.len() {
            ShutdownOutcome::Partial
        } else {
            ShutdownOutcome::Failed
        };

        let failed = if outcome == ShutdownOutcome::Failed {
            final_remaining.keys().cloned().collect()
        } else {
            Vec::new()
        };

        let status = ShutdownStatus {
            outcome,
            fully_closed,
            partially_closed: final_remaining,
            failed,
            orders_cancelled,
            retry_attempts: retry_count + 1,
            total_wait_time,
            reason: self.stop_reason().unwrap_or_else(|| "unknown".to_string()),
        };

        tracing::warn!(
            outcome = ?status.outcome,
            closed = status.fully_closed.len(),
            remaining = status.partially_closed.len(),
            attempts = status.retry_attempts,
            "shutdown complete"
        );
        status
    }
}

fn effective_flatten_instant_utc(
    date: NaiveDate,
    actual_close: NaiveTime,
    configured_flatten_time: NaiveTime,
) -> DateTime<Utc> {
    const REGULAR_CLOSE_MINUTES: i64 = 16 * 60;
    let configured_minutes =
        configured_flatten_time.hour() as i64 * 60 + configured_flatten_time.minute() as i64;
    let minutes_before_close = (REGULAR_CLOSE_MINUTES - configured_minutes).max(0);

    let actual_close_minutes = actual_close.hour() as i64 * 60 + actual_close.minute() as i64;
    let flatten_minutes =
        (actual_close_minutes - minutes_before_close).clamp(0, actual_close_minutes);

    let flatten_time_et =
        NaiveTime::from_hms_opt((flatten_minutes / 60) as u32, (flatten_minutes % 60) as u32, 0)
            .unwrap();

    let naive_et = date.and_time(flatten_time_et);
    New_York
        .from_local_datetime(&naive_et)
        .single()
        .unwrap_or_else(|| New_York.from_local_datetime(&naive_et).earliest().unwrap())
        .with_timezone(&Utc)
}

async fn submit_liquidation_orders(
    broker: &dyn BrokerAdapter,
    portfolio: &Mutex<PortfolioState>,
) -> Vec<String> {
    let positions: Vec<(String, Decimal)> = {
        let guard = portfolio.lock().unwrap();
        guard
            .positions
            .values()
            .filter(|p| p.quantity.abs() >= FLAT_EPSILON)
            .map(|p| (p.symbol.clone(), p.quantity))
            .collect()
    };

    let mut submitted = Vec::new();
    for (symbol, qty) in positions {
        let side = if qty > Decimal::ZERO { Side::Sell } else { Side::Buy };
        let close_qty = qty.abs();
        let order = OrderRequest::new(
            format!("LIQ_{symbol}_{}", Utc::now().timestamp_millis()),
            symbol.clone(),
            side,
            close_qty,
            OrderKind::Market,
            TimeInForce::Day,
            Utc::now(),
        );
        match broker.submit(order).await {
            Ok(_) => submitted.push(symbol),
            Err(err) => {
                tracing::error!(symbol = %symbol, error = %err, "failed to submit liquidation order")
            }
        }
    }
    submitted
}

async fn monitor_fills(portfolio: &Mutex<PortfolioState>, timeout: Duration) -> Vec<String> {
    let initial: BTreeMap<String, Decimal> = {
        let guard = portfolio.lock().unwrap();
        guard.positions.iter().map(|(s, p)| (s.clone(), p.quantity)).collect()
    };
    let mut closed = Vec::new();
    let start = Instant::now();

    loop {
        let current = open_positions(portfolio);
        for symbol in initial.keys() {
            if closed.contains(symbol) {
                continue;
            }
            if !current.contains_key(symbol) {
                closed.push(symbol.clone());
            }
        }

        let all_closed = initial.keys().all(|s| closed.contains(s) || !current.contains_key(s));
        if all_closed {
            return closed;
        }
        if start.elapsed() >= timeout {
            tracing::warn!(closed = closed.len(), "fill monitoring timed out");
            return closed;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn open_positions(portfolio: &Mutex<PortfolioState>) -> BTreeMap<String, Decimal> {
    let guard = portfolio.lock().unwrap();
    guard
        .positions
        .iter()
        .filter(|(_, p)| p.quantity.abs() >= FLAT_EPSILON)
        .map(|(s, p)| (s.clone(), p.quantity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::StandardNyseCalendar;
    use chrono::TimeZone;

    fn et(date: (i32, u32, u32), time: (u32, u32, u32)) -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(date.0, date.1, date.2, time.0, time.1, time.2)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn disabled_flatten_never_fires() {
        let ctl = StopController::new(StopConfig {
            enable_eod_flatten: false,
            ..StopConfig::default()
        });
        let now = et((2024, 1, 8), (15, 45, 0));
        assert!(!ctl.check_eod_flatten(now, &StandardNyseCalendar));
    }

    #[test]
    fn regular_day_fires_at_fifteen_forty_five_et() {
        let ctl = StopController::new(StopConfig {
            enable_eod_flatten: true,
            ..StopConfig::default()
        });
        let before = et((2024, 1, 8), (15, 44, 59));
        assert!(!ctl.check_eod_flatten(before, &StandardNyseCalendar));

        let at = et((2024, 1, 8), (15, 45, 0));
        assert!(ctl.check_eod_flatten(at, &StandardNyseCalendar));
    }

    #[test]
    fn fires_only_once_per_day() {
        let ctl = StopController::new(StopConfig {
            enable_eod_flatten: true,
            ..StopConfig::default()
        });
        let at = et((2024, 1, 8), (15, 45, 0));
        assert!(ctl.check_eod_flatten(at, &StandardNyseCalendar));
        let later = et((2024, 1, 8), (15, 50, 0));
        assert!(!ctl.check_eod_flatten(later, &StandardNyseCalendar));
    }

    #[test]
    fn reset_allows_flatten_to_fire_again_next_day() {
        let ctl = StopController::new(StopConfig {
            enable_eod_flatten: true,
            ..StopConfig::default()
        });
        assert!(ctl.check_eod_flatten(et((2024, 1, 8), (15, 45, 0)), &StandardNyseCalendar));
        ctl.reset_eod_flatten();
        assert!(ctl.check_eod_flatten(et((2024, 1, 9), (15, 45, 0)), &StandardNyseCalendar));
    }

    #[test]
    fn early_close_day_reprojects_the_same_offset() {
        // 2024-07-03 closes at 13:00 ET; the configured offset of 15 minutes
        // before a regular 16:00 close reprojects onto 12:45 ET.
        let ctl = StopController::new(StopConfig {
            enable_eod_flatten: true,
            ..StopConfig::default()
        });
        let before = et((2024, 7, 3), (12, 44, 59));
        assert!(!ctl.check_eod_flatten(before, &StandardNyseCalendar));

        let at = et((2024, 7, 3), (12, 45, 0));
        assert!(ctl.check_eod_flatten(at, &StandardNyseCalendar));
    }

    // 2024-03-10 is the US spring-forward date (02:00 EST -> 03:00 EDT);
    // 2024-11-03 is the fall-back date (02:00 EDT -> 01:00 EST). Neither
    // transition happens anywhere near the market close, but the flatten
    // instant still has to land on the correct UTC offset either side of
    // the switch, which only holds if the conversion goes through the
    // IANA tz database rather than a fixed UTC-5 approximation.
    #[test]
    fn spring_forward_day_still_flattens_at_the_correct_utc_instant() {
        let ctl = StopController::new(StopConfig {
            enable_eod_flatten: true,
            ..StopConfig::default()
        });
        // 15:45 EDT on 2024-03-10 is 19:45 UTC (EDT = UTC-4), not 20:45 UTC
        // (the EST offset that was in effect the day before).
        let before = Utc.with_ymd_and_hms(2024, 3, 10, 19, 44, 59).unwrap();
        assert!(!ctl.check_eod_flatten(before, &StandardNyseCalendar));
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 19, 45, 0).unwrap();
        assert!(ctl.check_eod_flatten(at, &StandardNyseCalendar));
    }

    #[test]
    fn fall_back_day_still_flattens_at_the_correct_utc_instant() {
        let ctl = StopController::new(StopConfig {
            enable_eod_flatten: true,
            ..StopConfig::default()
        });
        // 15:45 EST on 2024-11-03 is 20:45 UTC (EST = UTC-5), the offset
        // that takes effect that very morning.
        let before = Utc.with_ymd_and_hms(2024, 11, 3, 20, 44, 59).unwrap();
        assert!(!ctl.check_eod_flatten(before, &StandardNyseCalendar));
        let at = Utc.with_ymd_and_hms(2024, 11, 3, 20, 45, 0).unwrap();
        assert!(ctl.check_eod_flatten(at, &StandardNyseCalendar));
    }

    #[test]
    fn manual_stop_is_ignored_when_disabled_except_end_of_day() {
        let ctl = StopController::new(StopConfig {
            enable_manual_stop: false,
            ..StopConfig::default()
        });
        ctl.request_stop("manual");
        assert!(!ctl.is_stop_requested());

        ctl.request_stop("end_of_day");
        assert!(ctl.is_stop_requested());
        assert_eq!(ctl.stop_reason().as_deref(), Some("end_of_day"));
    }

    #[test]
    fn end_of_day_flatten_reason_is_honored_when_manual_stop_disabled() {
        let ctl = StopController::new(StopConfig {
            enable_manual_stop: false,
            ..StopConfig::default()
        });
        ctl.request_stop("end_of_day_flatten");
        assert!(ctl.is_stop_requested());
        assert_eq!(ctl.stop_reason().as_deref(), Some("end_of_day_flatten"));
    }

    #[test]
    fn first_stop_reason_wins() {
        let ctl = StopController::new(StopConfig::default());
        ctl.request_stop("manual");
        ctl.request_stop("end_of_day");
        assert_eq!(ctl.stop_reason().as_deref(), Some("manual"));
    }
}
