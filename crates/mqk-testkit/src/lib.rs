//! Shared scaffolding for the `tests/scenario_*.rs` end-to-end suite (spec
//! §8's concrete scenarios, run against the real `TradingCoordinator` +
//! `PaperBroker` pair rather than any single crate in isolation).
//!
//! Each scenario test drives a `ScriptedDecisionEngine` that replays a fixed
//! sequence of `Decision`s keyed by call count, so a scenario can pin down
//! "buy exactly 100 shares" without fighting the sizing engine's
//! fraction-of-equity math — the fraction is computed once, up front, from
//! the known starting equity and price.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use mqk_bars::Bar;
use mqk_broker_paper::{PaperBroker, PaperBrokerConfig};
use mqk_config::CoreConfig;
use mqk_execution::{BrokerAdapter, BrokerError, FillHandler, OrderRequest, SubscriptionId};
use mqk_runtime::TradingCoordinator;
use mqk_stopctl::{MarketCalendar, StandardNyseCalendar};
use mqk_strategy::{Decision, DecisionEngine, FillNotice, TradeIntent};
use rust_decimal::Decimal;

/// `h`/`m` are NYSE-local (America/New_York) wall-clock hour/minute on
/// 2026-01-05, a Monday under the regular winter EST (UTC-5) offset.
pub fn ts(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, h + 5, m, 0).unwrap()
}

pub fn bar(symbol: &str, close: Decimal, at: DateTime<Utc>) -> Bar {
    Bar::new(symbol, at, close, close, close, close, 1_000).unwrap()
}

/// Replays a fixed script of decisions, one per call to
/// `evaluate_opportunity`, then holds forever once the script is exhausted.
pub struct ScriptedDecisionEngine {
    script: Vec<Decision>,
    calls: usize,
    fills_seen: Vec<FillNotice>,
}

impl ScriptedDecisionEngine {
    pub fn new(script: Vec<Decision>) -> Self {
        Self { script, calls: 0, fills_seen: Vec::new() }
    }

    pub fn boxed(script: Vec<Decision>) -> Box<dyn DecisionEngine> {
        Box::new(Self::new(script))
    }
}

impl DecisionEngine for ScriptedDecisionEngine {
    fn evaluate_opportunity(&mut self, _symbol: &str, _history: &[Bar], _last_prices: &BTreeMap<String, Decimal>) -> Decision {
        let decision = self.script.get(self.calls).cloned().unwrap_or_else(|| Decision::hold("script exhausted"));
        self.calls += 1;
        decision
    }

    fn register_trade_intent(&mut self, _intent: &TradeIntent) {}

    fn handle_fill(&mut self, fill: &FillNotice) {
        self.fills_seen.push(fill.clone());
    }
}

/// Target fraction of `equity` that sizes a desired position of exactly
/// `qty` shares at `price` (the Coordinator computes
/// `desired_qty = side_sign * equity * fraction / price`).
pub fn fraction_for_target_qty(qty: Decimal, price: Decimal, equity: Decimal) -> Decimal {
    (qty * price / equity).abs()
}

pub struct Harness {
    pub coordinator: Arc<TradingCoordinator>,
    pub broker: Arc<PaperBroker>,
    _dir: tempfile::TempDir,
}

pub struct HarnessBuilder {
    config: CoreConfig,
    broker_config: PaperBrokerConfig,
    now: DateTime<Utc>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            config: CoreConfig::default(),
            broker_config: PaperBrokerConfig::default(),
            now: ts(9, 30),
        }
    }
}

impl HarnessBuilder {
    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_broker_config(mut self, broker_config: PaperBrokerConfig) -> Self {
        self.broker_config = broker_config;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn build(self, decision_engine: Box<dyn DecisionEngine>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(PaperBroker::new(self.broker_config));
        let calendar: Arc<dyn MarketCalendar> = Arc::new(StandardNyseCalendar);
        let coordinator = TradingCoordinator::new(
            self.config,
            broker.clone() as Arc<dyn BrokerAdapter>,
            decision_engine,
            dir.path().join("submitted_orders.json"),
            dir.path().join("checkpoint.json"),
            calendar,
            self.now,
        );
        Harness { coordinator, broker, _dir: dir }
    }
}

/// Deterministic (no slippage, no partial fills) broker config, the default
/// for every scenario that isn't specifically exercising slippage/partials.
pub fn exact_fill_broker_config() -> PaperBrokerConfig {
    PaperBrokerConfig { slip_bps: Decimal::ZERO, partial_fill_probability: 0.0, ..PaperBrokerConfig::default() }
}

/// Wraps a `PaperBroker` and lets a test flip `submit` between succeeding
/// (delegates to the inner broker) and failing with `BrokerError::NotConnected`,
/// simulating a broker outage (spec §8 scenario 6: rate-limit safety while
/// every submission attempt is being rejected).
pub struct FlakyBroker {
    inner: Arc<PaperBroker>,
    up: AtomicBool,
}

impl FlakyBroker {
    pub fn new(inner: Arc<PaperBroker>) -> Self {
        Self { inner, up: AtomicBool::new(true) }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl BrokerAdapter for FlakyBroker {
    async fn start(&self) -> Result<(), BrokerError> {
        self.inner.start().await
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        self.inner.stop().await
    }

    async fn submit(&self, order: OrderRequest) -> Result<String, BrokerError> {
        if !self.up.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        self.inner.submit(order).await
    }

    async fn cancel(&self, broker_order_id: &str) -> Result<bool, BrokerError> {
        self.inner.cancel(broker_order_id).await
    }

    async fn cancel_all(&self) -> Result<usize, BrokerError> {
        self.inner.cancel_all().await
    }

    async fn get_positions(&self) -> Result<BTreeMap<String, (Decimal, Decimal)>, BrokerError> {
        self.inner.get_positions().await
    }

    async fn subscribe_bars(&self, symbol: &str, bar_size_secs: i64) -> Result<SubscriptionId, BrokerError> {
        self.inner.subscribe_bars(symbol, bar_size_secs).await
    }

    async fn unsubscribe(&self, sub_id: SubscriptionId) -> Result<(), BrokerError> {
        self.inner.unsubscribe(sub_id).await
    }

    fn set_fill_handler(&self, handler: FillHandler) {
        self.inner.set_fill_handler(handler);
    }
}
