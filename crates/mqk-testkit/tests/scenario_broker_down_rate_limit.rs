//! Scenario 6 (spec §8): max 10 orders/min configured. With `broker.submit`
//! raising on every call, attempt 20 orders in under a minute; once the
//! broker recovers, exactly 10 immediate successful submissions are allowed
//! before the per-minute cap rejects an 11th.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use mqk_bars::Bar;
use mqk_config::CoreConfig;
use mqk_execution::BrokerAdapter;
use mqk_strategy::{Decision, DecisionEngine};
use mqk_testkit::{bar, exact_fill_broker_config, fraction_for_target_qty, ts, FlakyBroker};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Always proposes the same long target; used here purely to generate a
/// submission attempt on every bar regardless of price, since the scenario
/// only cares about how many attempts reach the broker, not sizing.
struct AlwaysBuySameTarget(Decimal);

impl DecisionEngine for AlwaysBuySameTarget {
    fn evaluate_opportunity(&mut self, _symbol: &str, _history: &[Bar], _last_prices: &BTreeMap<String, Decimal>) -> Decision {
        Decision::trade(1, self.0, 1.0, "constant target")
    }
}

#[tokio::test]
async fn broker_outage_does_not_consume_rate_limit_budget() {
    let mut config = CoreConfig::default();
    config.risk.max_orders_per_minute = 10;
    let equity = dec!(100_000);
    let fraction = fraction_for_target_qty(dec!(1), dec!(50), equity);

    let dir = tempfile::tempdir().unwrap();
    let paper = Arc::new(mqk_broker_paper::PaperBroker::new(exact_fill_broker_config()));
    let flaky = Arc::new(FlakyBroker::new(paper.clone()));
    let coordinator = mqk_runtime::TradingCoordinator::new(
        config,
        flaky.clone() as Arc<dyn BrokerAdapter>,
        Box::new(AlwaysBuySameTarget(fraction)),
        dir.path().join("submitted_orders.json"),
        dir.path().join("checkpoint.json"),
        Arc::new(mqk_stopctl::StandardNyseCalendar),
        ts(9, 30),
    );
    coordinator.arm().unwrap();

    flaky.set_up(false);
    for i in 0..20 {
        coordinator.process_bar(bar("AAPL", dec!(50), ts(9, 31) + Duration::seconds(i))).await;
    }
    assert_eq!(paper.open_order_count(), 0, "no attempt should have reached the underlying broker");
    assert!(!coordinator.risk_snapshot().halted, "a down broker must never itself halt the risk engine");

    flaky.set_up(true);
    for i in 20..30 {
        coordinator.process_bar(bar("AAPL", dec!(50), ts(9, 31) + Duration::seconds(i))).await;
    }
    assert_eq!(paper.open_order_count(), 10, "exactly the rate-limit budget's worth of submissions should succeed");

    coordinator.process_bar(bar("AAPL", dec!(50), ts(9, 31) + Duration::seconds(30))).await;
    assert_eq!(paper.open_order_count(), 10, "the 11th submission within the same minute must be rejected by the risk engine");
}
