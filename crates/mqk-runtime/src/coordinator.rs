//! The Trading Coordinator (§4.K): the single orchestrator that wires every
//! other component (A-J) into the per-bar pipeline and the fill handler.
//!
//! Ported from `aistock/session/coordinator.py`'s control flow: the
//! `process_bar` step ordering and, above all, step 13's side-effect order
//! (broker acceptance is authoritative; risk/idempotency bookkeeping only
//! updates *after* the broker has accepted a submission) are carried over
//! verbatim. Everything downstream of a single bad bar, a risk violation, a
//! duplicate id, or a broker failure is logged and dropped in place —
//! never propagated as a panic or a bubbled error (spec §7).

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc, Weekday};
use chrono_tz::America::New_York;
use rust_decimal::Decimal;

use mqk_bars::{Bar, BarProcessor};
use mqk_checkpoint::Checkpointer;
use mqk_config::CoreConfig;
use mqk_execution::{BrokerAdapter, ExecutionReport, OrderKind, OrderRequest, Side, TimeInForce};
use mqk_idempotency::OrderIdempotencyTracker;
use mqk_integrity::ArmState;
use mqk_reconcile::Reconciler;
use mqk_risk::{RiskConfig, RiskState};
use mqk_stopctl::{MarketCalendar, ShutdownStatus, StopConfig, StopController};
use mqk_strategy::{DecisionEngine, FillNotice, TradeIntent};

use crate::redact::{CoreLogger, LogLevel, LogRecord, TracingLogger};
use crate::types::{CoordinatorError, EquityPoint, NoopWithdrawalHook, TradeLogEntry, WithdrawalHook};

/// Below this absolute delta, a sizing decision is treated as a no-op
/// (spec §4.K step 9: `|delta| < 1e-5`).
const MIN_TRADEABLE_DELTA: Decimal = Decimal::from_parts(1, 0, 0, false, 5);

/// Bound on in-memory trade log / equity curve retention. Durable
/// persistence of the JSONL files (§6) is a thin layer a caller adds on
/// top of `trade_log()`/`equity_curve()`; the core only bounds memory.
const LOG_CAPACITY: usize = 50_000;

/// Idempotency entries kept across a daily `clear_old` trim (§4.A).
const IDEMPOTENCY_RETENTION: usize = 10_000;

/// The per-bar pipeline orchestrator (§4.K). Owns every piece of mutable
/// core state; the broker and decision engine are the only components that
/// can call back into it (via the fill handler and, respectively, never —
/// the Coordinator calls the decision engine, not the reverse).
pub struct TradingCoordinator {
    config: CoreConfig,
    risk_config: RiskConfig,
    broker: Arc<dyn BrokerAdapter>,
    decision_engine: Mutex<Box<dyn DecisionEngine>>,
    bar_processor: Arc<BarProcessor>,
    portfolio: Mutex<mqk_portfolio::PortfolioState>,
    risk: Mutex<RiskState>,
    idempotency: Mutex<OrderIdempotencyTracker>,
    checkpointer: Mutex<Checkpointer>,
    reconciler: Mutex<Reconciler>,
    stop_controller: Arc<StopController>,
    calendar: Arc<dyn MarketCalendar>,
    arm_state: Mutex<ArmState>,
    withdrawal_hook: Box<dyn WithdrawalHook>,
    last_bar_date: Mutex<Option<chrono::NaiveDate>>,
    last_withdrawal_check: Mutex<Option<DateTime<Utc>>>,
    pending_orders: Mutex<BTreeMap<String, DateTime<Utc>>>,
    trade_log: Mutex<VecDeque<TradeLogEntry>>,
    equity_curve: Mutex<VecDeque<EquityPoint>>,
    shutdown_executed: AtomicBool,
    last_shutdown_status: Mutex<Option<ShutdownStatus>>,
    logger: Box<dyn CoreLogger>,
}

impl TradingCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CoreConfig,
        broker: Arc<dyn BrokerAdapter>,
        decision_engine: Box<dyn DecisionEngine>,
        idempotency_path: PathBuf,
        checkpoint_path: PathBuf,
        calendar: Arc<dyn MarketCalendar>,
        now: DateTime<Utc>,
    ) -> Arc<Self> {
        Self::new_with_withdrawal_hook(
            config,
            broker,
            decision_engine,
            idempotency_path,
            checkpoint_path,
            calendar,
            Box::new(NoopWithdrawalHook),
            now,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_with_withdrawal_hook(
        config: CoreConfig,
        broker: Arc<dyn BrokerAdapter>,
        decision_engine: Box<dyn DecisionEngine>,
        idempotency_path: PathBuf,
        checkpoint_path: PathBuf,
        calendar: Arc<dyn MarketCalendar>,
        withdrawal_hook: Box<dyn WithdrawalHook>,
        now: DateTime<Utc>,
    ) -> Arc<Self> {
        Self::new_with_logger(config, broker, decision_engine, idempotency_path, checkpoint_path, calendar, withdrawal_hook, Box::new(TracingLogger), now)
    }

    /// Same as `new_with_withdrawal_hook`, with an explicit `CoreLogger`
    /// (Design Notes §9: the logger is an injectable target, never a
    /// process-wide singleton). Tests use this to assert on emitted
    /// records without installing a global `tracing` subscriber.
    #[allow(clippy::too_many_arguments)]
    pub fn new_with_logger(
        config: CoreConfig,
        broker: Arc<dyn BrokerAdapter>,
        decision_engine: Box<dyn DecisionEngine>,
        idempotency_path: PathBuf,
        checkpoint_path: PathBuf,
        calendar: Arc<dyn MarketCalendar>,
        withdrawal_hook: Box<dyn WithdrawalHook>,
        logger: Box<dyn CoreLogger>,
        now: DateTime<Utc>,
    ) -> Arc<Self> {
        let risk_config: RiskConfig = (&config.risk).into();
        let stop_config = StopConfig {
            enable_manual_stop: config.stop.enable_manual_stop,
            enable_eod_flatten: config.stop.enable_eod_flatten,
            eod_flatten_time_et: config.stop.eod_flatten_time_et,
            emergency_liquidation_timeout: std::time::Duration::from_secs_f64(
                config.stop.emergency_liquidation_timeout_secs.max(0.0),
            ),
        };

        let restored = mqk_checkpoint::load_with_backup(&checkpoint_path).ok().flatten();
        let (portfolio, risk) = match restored {
            Some(snapshot) => (snapshot.portfolio.restore(), snapshot.risk.restore()),
            None => (
                mqk_portfolio::PortfolioState::new(config.engine.initial_equity),
                RiskState::new(now.date_naive(), config.engine.initial_equity),
            ),
        };

        let idempotency = OrderIdempotencyTracker::new(idempotency_path, config.idem.expiration_minutes);
        let warmup_bars = config.data.warmup_bars;
        let reconcile_interval = config.reconcile.interval_minutes;

        let this = Arc::new(Self {
            config,
            risk_config,
            broker,
            decision_engine: Mutex::new(decision_engine),
            bar_processor: Arc::new(BarProcessor::new(warmup_bars)),
            portfolio: Mutex::new(portfolio),
            risk: Mutex::new(risk),
            idempotency: Mutex::new(idempotency),
            checkpointer: Mutex::new(Checkpointer::new(checkpoint_path)),
            reconciler: Mutex::new(Reconciler::new(reconcile_interval)),
            stop_controller: Arc::new(StopController::new(stop_config)),
            calendar,
            arm_state: Mutex::new(ArmState::boot(None)),
            withdrawal_hook,
            last_bar_date: Mutex::new(None),
            last_withdrawal_check: Mutex::new(None),
            pending_orders: Mutex::new(BTreeMap::new()),
            trade_log: Mutex::new(VecDeque::new()),
            equity_curve: Mutex::new(VecDeque::new()),
            shutdown_executed: AtomicBool::new(false),
            last_shutdown_status: Mutex::new(None),
            logger,
        });

        this.install_fill_handler();
        this
    }

    fn install_fill_handler(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.broker.set_fill_handler(Arc::new(move |report: ExecutionReport| {
            this.handle_fill(report);
        }));
    }

    // ---- operator-facing controls -------------------------------------

    /// Explicit operator arm (mqk-integrity's fail-closed idiom): the
    /// Coordinator starts disarmed on construction and will not size or
    /// submit any order until armed. Refuses to arm while the risk engine
    /// is halted — clearing the halt is a separate, deliberate operator
    /// action (`mqk_risk::clear_halt` on a loaded `RiskState`, out of this
    /// type's surface since nothing in the core auto-clears a halt).
    pub fn arm(&self) -> Result<(), CoordinatorError> {
        let risk = self.risk.lock().expect("risk mutex poisoned");
        if risk.halted {
            return Err(CoordinatorError::StillHalted(
                risk.halt_reason.clone().unwrap_or_else(|| "unknown".to_string()),
            ));
        }
        drop(risk);
        *self.arm_state.lock().expect("arm mutex poisoned") = ArmState::arm();
        Ok(())
    }

    pub fn disarm(&self) {
        *self.arm_state.lock().expect("arm mutex poisoned") = ArmState::manual_disarm();
    }

    pub fn is_armed(&self) -> bool {
        self.arm_state.lock().expect("arm mutex poisoned").is_armed()
    }

    pub fn arm_state(&self) -> ArmState {
        self.arm_state.lock().expect("arm mutex poisoned").clone()
    }

    pub fn request_stop(&self, reason: impl Into<String>) {
        self.stop_controller.request_stop(reason);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_controller.is_stop_requested()
    }

    pub fn shutdown_status(&self) -> Option<ShutdownStatus> {
        self.last_shutdown_status.lock().expect("shutdown status mutex poisoned").clone()
    }

    // ---- introspection for diagnostics/tests ---------------------------

    pub fn portfolio_snapshot(&self) -> mqk_portfolio::PortfolioState {
        self.portfolio.lock().expect("portfolio mutex poisoned").clone()
    }

    pub fn risk_snapshot(&self) -> RiskState {
        self.risk.lock().expect("risk mutex poisoned").clone()
    }

    pub fn bar_processor(&self) -> &Arc<BarProcessor> {
        &self.bar_processor
    }

    pub fn pending_order_count(&self) -> usize {
        self.pending_orders.lock().expect("pending orders mutex poisoned").len()
    }

    pub fn trade_log(&self) -> Vec<TradeLogEntry> {
        self.trade_log.lock().expect("trade log mutex poisoned").iter().cloned().collect()
    }

    pub fn equity_curve(&self) -> Vec<EquityPoint> {
        self.equity_curve.lock().expect("equity curve mutex poisoned").iter().copied().collect()
    }

    /// Flush any queued checkpoint writes and perform a final synchronous
    /// save. Intended for an orderly process exit.
    pub fn finalize_checkpoint(&self) {
        let portfolio = self.portfolio.lock().expect("portfolio mutex poisoned");
        let risk = self.risk.lock().expect("risk mutex poisoned");
        self.checkpointer.lock().expect("checkpointer mutex poisoned").shutdown(&portfolio, &risk);
    }

    // ---- the per-bar pipeline (§4.K) ------------------------------------

    /// Process one bar end to end. Never panics or returns an error for a
    /// single bad bar, risk rejection, duplicate id, or broker failure —
    /// each of those is logged and the bar's trading signal (if any) is
    /// simply dropped, per spec §7.
    pub async fn process_bar(self: &Arc<Self>, bar: Bar) {
        // 1. stop requested -> graceful shutdown (run once), no new orders.
        if self.stop_controller.is_stop_requested() {
            self.maybe_run_graceful_shutdown().await;
            return;
        }

        // 2. day rollover detection (exchange-local date).
        let bar_date = bar.ts.with_timezone(&New_York).date_naive();
        let is_new_day = {
            let mut last = self.last_bar_date.lock().expect("last bar date mutex poisoned");
            let is_new = *last != Some(bar_date);
            *last = Some(bar_date);
            is_new
        };
        if is_new_day {
            self.stop_controller.reset_eod_flatten();
            self.roll_risk_day(bar_date, bar.ts);
        }

        // 3. EOD flatten check.
        if self.stop_controller.check_eod_flatten(bar.ts, self.calendar.as_ref()) {
            self.stop_controller.request_stop("end_of_day_flatten");
            return;
        }

        // 4. bar processor append + last-price update.
        if let Err(err) = self.bar_processor.process_bar(bar.clone()) {
            tracing::warn!(error = %err, symbol = %bar.symbol, "dropping invalid bar");
            return;
        }

        // 5. trading-hours gate.
        if self.config.data.enforce_trading_hours && !self.is_within_trading_hours(bar.ts) {
            return;
        }

        // 6. reconciler (may halt risk on critical drift).
        self.maybe_reconcile(bar.ts).await;

        // 7. withdrawal hook (external capital-management collaborator).
        self.maybe_check_withdrawal(bar.ts);

        // mqk-integrity fail-closed gate: no sizing/submission while disarmed.
        if !self.is_armed() {
            return;
        }

        // 8. decision engine.
        let history = self.bar_processor.recent_bars(&bar.symbol);
        let last_prices = self.bar_processor.last_prices();
        let decision = {
            let mut engine = self.decision_engine.lock().expect("decision engine mutex poisoned");
            engine.evaluate_opportunity(&bar.symbol, &history, &last_prices)
        };
        if !decision.should_trade {
            return;
        }

        // 9. size the target delta.
        let (current_qty, equity) = {
            let portfolio = self.portfolio.lock().expect("portfolio mutex poisoned");
            let qty = portfolio.position(&bar.symbol).map(|p| p.quantity).unwrap_or(Decimal::ZERO);
            let equity = match mqk_portfolio::equity(&portfolio, &last_prices) {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping bar: equity computation failed");
                    return;
                }
            };
            (qty, equity)
        };

        let side_sign = Decimal::from(decision.side_signal as i64);
        let target_notional = equity * decision.size_fraction;
        let desired_qty = side_sign * target_notional / bar.close;
        let delta = desired_qty - current_qty;
        if delta.abs() < MIN_TRADEABLE_DELTA {
            return;
        }

        // 10. deterministic client order id.
        let client_order_id = OrderIdempotencyTracker::generate_client_order_id(&bar.symbol, bar.ts, Some(delta));

        // 11. idempotency dedup. `mark_submitted` below stamps wall-clock time
        // (so replayed/backfilled bars can't corrupt the TTL), so the
        // freshness check here must use the same clock, not `bar.ts`.
        let is_duplicate = {
            let idempotency = self.idempotency.lock().expect("idempotency mutex poisoned");
            idempotency.is_duplicate(&client_order_id, Utc::now())
        };
        if is_duplicate {
            tracing::info!(id = %client_order_id, "duplicate client order id, dropping signal");
            return;
        }

        // 12. pre-trade risk check.
        let q_after = current_qty + delta;
        let risk_result = {
            let mut risk = self.risk.lock().expect("risk mutex poisoned");
            mqk_risk::check_pre_trade(&self.risk_config, &mut risk, q_after, bar.close, equity, bar.ts)
        };
        if let Err(violation) = risk_result {
            tracing::warn!(symbol = %bar.symbol, reason = %violation, "pre-trade risk check rejected order");
            self.sync_arm_with_risk();
            return;
        }

        // 13. side effects, in the critical order: submit is authoritative.
        let side = Side::from_signed_qty(delta);
        let order = OrderRequest::new(
            client_order_id.clone(),
            bar.symbol.clone(),
            side,
            delta.abs(),
            OrderKind::Market,
            TimeInForce::Day,
            bar.ts,
        );

        {
            let mut engine = self.decision_engine.lock().expect("decision engine mutex poisoned");
            engine.register_trade_intent(&TradeIntent {
                symbol: bar.symbol.clone(),
                delta_qty: delta,
                side_signal: decision.side_signal,
            });
        }

        match self.broker.submit(order).await {
            Ok(broker_order_id) => {
                let now = Utc::now();
                {
                    let mut risk = self.risk.lock().expect("risk mutex poisoned");
                    mqk_risk::record_order_submission(&mut risk, now);
                }
                let mark_result = {
                    let mut idempotency = self.idempotency.lock().expect("idempotency mutex poisoned");
                    idempotency.mark_submitted(client_order_id.clone(), now)
                };
                if let Err(err) = mark_result {
                    // The broker has already accepted this order; failing to
                    // persist the dedup record only narrows (not widens) the
                    // duplicate window on a subsequent crash+restart. Log and
                    // continue rather than treat an already-placed order as
                    // a failure.
                    tracing::error!(error = %err, id = %client_order_id, "failed to persist idempotency record after broker accepted submission");
                }
                self.pending_orders
                    .lock()
                    .expect("pending orders mutex poisoned")
                    .insert(broker_order_id, now);
            }
            Err(err) => {
                tracing::error!(error = %err, symbol = %bar.symbol, "broker rejected submission");
            }
        }
    }

    fn roll_risk_day(&self, today: chrono::NaiveDate, now: DateTime<Utc>) {
        let prices = self.bar_processor.last_prices();
        let equity = {
            let portfolio = self.portfolio.lock().expect("portfolio mutex poisoned");
            mqk_portfolio::equity(&portfolio, &prices).unwrap_or(portfolio.cash)
        };

        let mut risk = self.risk.lock().expect("risk mutex poisoned");
        mqk_risk::roll_day_if_needed(&mut risk, today, now, equity);
        drop(risk);

        let mut idempotency = self.idempotency.lock().expect("idempotency mutex poisoned");
        let _ = idempotency.clear_old_ids(IDEMPOTENCY_RETENTION);
    }

    async fn maybe_reconcile(&self, now: DateTime<Utc>) {
        let due = {
            let reconciler = self.reconciler.lock().expect("reconciler mutex poisoned");
            reconciler.is_due(now)
        };
        if !due {
            return;
        }

        let broker_positions: BTreeMap<String, Decimal> = match self.broker.get_positions().await {
            Ok(positions) => positions.into_iter().map(|(symbol, (qty, _avg))| (symbol, qty)).collect(),
            Err(err) => {
                tracing::error!(error = %err, "reconciler failed to fetch broker positions");
                return;
            }
        };

        let local_positions: BTreeMap<String, Decimal> = {
            let portfolio = self.portfolio.lock().expect("portfolio mutex poisoned");
            portfolio
                .positions
                .values()
                .filter(|p| !p.is_flat())
                .map(|p| (p.symbol.clone(), p.quantity))
                .collect()
        };

        let mut risk = self.risk.lock().expect("risk mutex poisoned");
        let mut reconciler = self.reconciler.lock().expect("reconciler mutex poisoned");
        let report = reconciler.reconcile(now, &local_positions, &broker_positions, &mut risk);
        drop(reconciler);
        drop(risk);

        if report.critical {
            tracing::error!(ts = %report.ts, "critical position reconciliation mismatch, risk engine halted");
            self.sync_arm_with_risk();
        } else if !report.drifts.is_empty() {
            tracing::warn!(count = report.drifts.len(), "minor position drift detected");
        }
    }

    fn maybe_check_withdrawal(&self, now: DateTime<Utc>) {
        let due = {
            let mut last = self.last_withdrawal_check.lock().expect("withdrawal check mutex poisoned");
            let due = match *last {
                None => true,
                Some(prev) => now - prev >= chrono::Duration::hours(12),
            };
            if due {
                *last = Some(now);
            }
            due
        };
        if !due {
            return;
        }
        let prices = self.bar_processor.last_prices();
        let equity = {
            let portfolio = self.portfolio.lock().expect("portfolio mutex poisoned");
            mqk_portfolio::equity(&portfolio, &prices).unwrap_or(portfolio.cash)
        };
        self.withdrawal_hook.maybe_withdraw(equity, now);
    }

    fn sync_arm_with_risk(&self) {
        let risk = self.risk.lock().expect("risk mutex poisoned");
        if risk.halted {
            let mut arm = self.arm_state.lock().expect("arm mutex poisoned");
            if arm.is_armed() {
                let reason = risk.halt_reason.clone().unwrap_or_else(|| "unknown".to_string());
                let record = LogRecord::new().field("halt_reason", &reason);
                self.logger.log(LogLevel::Error, "risk engine halted, disarming coordinator", &record);
                *arm = ArmState::risk_halt(reason);
            }
        }
    }

    fn is_within_trading_hours(&self, ts: DateTime<Utc>) -> bool {
        let local = ts.with_timezone(&New_York);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let (open, close) = if self.config.data.allow_extended_hours {
            (
                chrono::NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
                chrono::NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            )
        } else {
            (
                chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                self.calendar.actual_close(local.date_naive()),
            )
        };
        let time = local.time();
        time >= open && time <= close
    }

    async fn maybe_run_graceful_shutdown(self: &Arc<Self>) {
        if self.shutdown_executed.swap(true, Ordering::SeqCst) {
            return;
        }
        let status = self.stop_controller.execute_graceful_shutdown(self.broker.as_ref(), &self.portfolio).await;
        tracing::warn!(outcome = ?status.outcome, "graceful shutdown executed");
        *self.last_shutdown_status.lock().expect("shutdown status mutex poisoned") = Some(status);
    }

    // ---- fill handling (broker-reader-thread side, §4.K fill handler) --

    fn handle_fill(&self, report: ExecutionReport) {
        let signed_qty = report.qty * Decimal::from(report.side.sign());
        let fill = mqk_portfolio::Fill::new(
            report.symbol.clone(),
            signed_qty,
            report.price,
            self.config.engine.commission_per_trade,
            report.ts,
        );

        let (realized, equity) = {
            let mut portfolio = self.portfolio.lock().expect("portfolio mutex poisoned");
            let realized = mqk_portfolio::apply_fill(&mut portfolio, fill);
            self.bar_processor.update_price(&report.symbol, report.price);
            let prices = self.bar_processor.last_prices();
            let equity = mqk_portfolio::equity(&portfolio, &prices).unwrap_or(portfolio.cash);

            // Commission is already deducted from cash inside apply_fill;
            // passing it again here would double-count it against
            // daily_pnl (spec §4.K fill-handler step 4).
            let mut risk = self.risk.lock().expect("risk mutex poisoned");
            mqk_risk::register_trade(&self.risk_config, &mut risk, realized, Decimal::ZERO, equity);
            (realized, equity)
        };
        self.sync_arm_with_risk();

        self.push_trade_log(TradeLogEntry {
            ts: report.ts,
            symbol: report.symbol.clone(),
            qty_signed: signed_qty,
            price: report.price,
            realized_pnl: realized,
            order_id: report.broker_order_id.clone(),
        });
        self.push_equity_point(EquityPoint { ts: report.ts, equity });

        {
            let mut engine = self.decision_engine.lock().expect("decision engine mutex poisoned");
            engine.handle_fill(&FillNotice {
                symbol: report.symbol.clone(),
                signed_qty,
                price: report.price,
                realized_pnl: realized,
            });
        }

        {
            let portfolio = self.portfolio.lock().expect("portfolio mutex poisoned");
            let risk = self.risk.lock().expect("risk mutex poisoned");
            self.checkpointer.lock().expect("checkpointer mutex poisoned").save_async(&portfolio, &risk);
        }

        if !report.is_partial || report.remaining.is_zero() {
            self.pending_orders
                .lock()
                .expect("pending orders mutex poisoned")
                .remove(&report.broker_order_id);
        }
    }

    fn push_trade_log(&self, entry: TradeLogEntry) {
        let mut log = self.trade_log.lock().expect("trade log mutex poisoned");
        log.push_back(entry);
        while log.len() > LOG_CAPACITY {
            log.pop_front();
        }
    }

    fn push_equity_point(&self, point: EquityPoint) {
        let mut curve = self.equity_curve.lock().expect("equity curve mutex poisoned");
        curve.push_back(point);
        while curve.len() > LOG_CAPACITY {
            curve.pop_front();
        }
    }
}
