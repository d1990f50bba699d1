//! Scenario 2 (spec §8): sell short 100 @ 50, cover 100 @ 60. Expect
//! realized = -$1000.

use mqk_strategy::Decision;
use mqk_testkit::{bar, exact_fill_broker_config, fraction_for_target_qty, ts, HarnessBuilder, ScriptedDecisionEngine};
use rust_decimal_macros::dec;

#[tokio::test]
async fn short_round_trip_realizes_a_loss() {
    let equity = dec!(100_000);
    let short_fraction = fraction_for_target_qty(dec!(100), dec!(50), equity);

    let script = vec![
        Decision::trade(-1, short_fraction, 1.0, "open short 100 @ 50"),
        Decision::trade(1, dec!(0), 1.0, "cover"),
    ];
    let harness = HarnessBuilder::default()
        .with_broker_config(exact_fill_broker_config())
        .build(ScriptedDecisionEngine::boxed(script));
    harness.coordinator.arm().unwrap();

    harness.coordinator.process_bar(bar("AAPL", dec!(50), ts(9, 31))).await;
    harness.broker.process_bar(&bar("AAPL", dec!(50), ts(9, 32)), ts(9, 32));
    assert_eq!(harness.coordinator.portfolio_snapshot().position("AAPL").unwrap().quantity, dec!(-100));

    harness.coordinator.process_bar(bar("AAPL", dec!(60), ts(9, 33))).await;
    harness.broker.process_bar(&bar("AAPL", dec!(60), ts(9, 34)), ts(9, 34));

    let portfolio = harness.coordinator.portfolio_snapshot();
    assert!(portfolio.position("AAPL").unwrap().is_flat());

    let log = harness.coordinator.trade_log();
    let realized_total: rust_decimal::Decimal = log.iter().map(|e| e.realized_pnl).sum();
    assert_eq!(realized_total, dec!(-1000));
}
