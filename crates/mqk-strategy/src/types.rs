use std::collections::BTreeMap;

use mqk_bars::Bar;
use rust_decimal::Decimal;

/// Output of `DecisionEngine::evaluate_opportunity` for a single symbol/bar.
///
/// `side_signal` is one of `-1` (short/sell), `0` (no opinion), `+1`
/// (long/buy). `size_fraction` is a target fraction of equity in `[0, 1]`;
/// the Coordinator converts it to a desired notional, not the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub should_trade: bool,
    pub side_signal: i8,
    pub size_fraction: Decimal,
    pub confidence: f64,
    pub reason: String,
}

impl Decision {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            should_trade: false,
            side_signal: 0,
            size_fraction: Decimal::ZERO,
            confidence: 0.0,
            reason: reason.into(),
        }
    }

    pub fn trade(side_signal: i8, size_fraction: Decimal, confidence: f64, reason: impl Into<String>) -> Self {
        debug_assert!(side_signal == -1 || side_signal == 0 || side_signal == 1);
        debug_assert!(size_fraction >= Decimal::ZERO && size_fraction <= Decimal::ONE);
        Self {
            should_trade: side_signal != 0 && size_fraction > Decimal::ZERO,
            side_signal,
            size_fraction,
            confidence,
            reason: reason.into(),
        }
    }
}

/// A trading intent about to be submitted, passed to `register_trade_intent`
/// for engines that want advisory notice before the broker call.
#[derive(Clone, Debug, PartialEq)]
pub struct TradeIntent {
    pub symbol: String,
    pub delta_qty: Decimal,
    pub side_signal: i8,
}

/// A realized fill, passed to `handle_fill` for online learning. Mirrors the
/// subset of `ExecutionReport` a decision engine plausibly cares about.
#[derive(Clone, Debug, PartialEq)]
pub struct FillNotice {
    pub symbol: String,
    pub signed_qty: Decimal,
    pub price: Decimal,
    pub realized_pnl: Decimal,
}

/// Opaque to the core: the policy that decides whether/how to trade a
/// symbol given its recent bar history and the last known prices of every
/// tracked symbol. The Coordinator invokes this trait but never interprets
/// its internal state; optional hooks exist purely for engines that learn
/// online and need to be told what happened.
///
/// `evaluate_opportunity` may hold and mutate internal state (the trait
/// requires `&mut self`) but must never corrupt the Coordinator's own state
/// — all mutation is confined to the engine's own fields.
pub trait DecisionEngine: Send {
    fn evaluate_opportunity(
        &mut self,
        symbol: &str,
        history: &[Bar],
        last_prices: &BTreeMap<String, Decimal>,
    ) -> Decision;

    /// Advisory notice that the Coordinator is about to submit an order
    /// matching this intent. Default: no-op.
    fn register_trade_intent(&mut self, _intent: &TradeIntent) {}

    /// Learning hook invoked from the fill handler after the Portfolio has
    /// applied the fill. Default: no-op.
    fn handle_fill(&mut self, _fill: &FillNotice) {}

    fn start_session(&mut self) {}

    fn end_session(&mut self) {}

    /// Serialize engine-internal state for checkpointing. Default: none.
    fn save_state(&self) -> Option<Vec<u8>> {
        None
    }

    /// Restore engine-internal state from a prior `save_state`. Default: no-op.
    fn load_state(&mut self, _state: &[u8]) {}
}

/// A `DecisionEngine` that never trades. Useful as a coordinator default
/// and in tests that only exercise the non-strategy plumbing.
#[derive(Default)]
pub struct NoopDecisionEngine;

impl DecisionEngine for NoopDecisionEngine {
    fn evaluate_opportunity(
        &mut self,
        _symbol: &str,
        _history: &[Bar],
        _last_prices: &BTreeMap<String, Decimal>,
    ) -> Decision {
        Decision::hold("noop engine")
    }
}
