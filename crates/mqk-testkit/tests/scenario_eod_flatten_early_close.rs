//! Scenario 7 (spec §8): flatten configured at 15:45 ET (15 minutes before a
//! regular 16:00 close). On 2024-07-03, an NYSE early-close day (13:00 ET),
//! the effective flatten instant reprojects to 12:45 ET rather than firing
//! at the configured wall-clock time. Holding a long position, the bar right
//! at 12:45 ET triggers the stop request; the following bar runs the
//! graceful-shutdown sequence, which submits a liquidation order for the
//! still-open long. (The retry/liquidation mechanics themselves, including
//! the case where fills actually land, are covered directly in mqk-stopctl;
//! this scenario is about the early-close reprojection producing the right
//! instant in the first place.)

use chrono::TimeZone;
use chrono_tz::America::New_York;
use mqk_config::CoreConfig;
use mqk_execution::BrokerAdapter;
use mqk_strategy::Decision;
use mqk_testkit::{bar, exact_fill_broker_config, fraction_for_target_qty, ScriptedDecisionEngine};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn et(h: u32, m: u32) -> chrono::DateTime<chrono::Utc> {
    New_York.with_ymd_and_hms(2024, 7, 3, h, m, 0).unwrap().with_timezone(&chrono::Utc)
}

#[tokio::test]
async fn early_close_day_flattens_fifteen_minutes_before_the_actual_close() {
    let equity = dec!(100_000);
    let fraction = fraction_for_target_qty(dec!(100), dec!(50), equity);

    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(mqk_broker_paper::PaperBroker::new(exact_fill_broker_config()));
    let mut config = CoreConfig::default();
    config.stop.enable_eod_flatten = true;
    config.stop.eod_flatten_time_et = chrono::NaiveTime::from_hms_opt(15, 45, 0).unwrap();
    // The paper broker only fills against an explicit `process_bar` call, not
    // on a bare `submit`, so the shutdown sequence's liquidation order can
    // never actually fill within this test. A short timeout keeps the test
    // fast; what's under test here is the flatten-instant reprojection, not
    // the retry/liquidation mechanics (covered directly in mqk-stopctl).
    config.stop.emergency_liquidation_timeout_secs = 0.05;

    // Opens a 100-share long on the first evaluated bar, then holds for
    // every bar after that — the rest of the scenario is driven entirely
    // by the stop controller's own flatten logic, not fresh decisions.
    let engine = ScriptedDecisionEngine::new(vec![Decision::trade(1, fraction, 1.0, "open the position")]);

    let coordinator = mqk_runtime::TradingCoordinator::new(
        config,
        broker.clone() as Arc<dyn BrokerAdapter>,
        Box::new(engine),
        dir.path().join("submitted_orders.json"),
        dir.path().join("checkpoint.json"),
        Arc::new(mqk_stopctl::StandardNyseCalendar),
        et(9, 30),
    );
    coordinator.arm().unwrap();

    // Establish the long position.
    coordinator.process_bar(bar("AAPL", dec!(50), et(9, 31))).await;
    broker.process_bar(&bar("AAPL", dec!(50), et(9, 32)), et(9, 32));
    assert!(coordinator.portfolio_snapshot().position("AAPL").unwrap().is_long());

    // Before 12:45 ET: no flatten yet.
    coordinator.process_bar(bar("AAPL", dec!(50), et(12, 44))).await;
    assert!(!coordinator.is_stop_requested(), "flatten must not fire before the reprojected early-close offset");

    // At 12:45 ET: the stop request fires on this bar...
    coordinator.process_bar(bar("AAPL", dec!(50), et(12, 45))).await;
    assert!(coordinator.is_stop_requested(), "flatten must fire at 12:45 ET on an early-close day, not 15:45 ET");

    // ...and the graceful shutdown sequence runs on the very next bar,
    // submitting a liquidation order for the still-open long.
    coordinator.process_bar(bar("AAPL", dec!(50), et(12, 45) + chrono::Duration::seconds(1))).await;
    let status = coordinator.shutdown_status().expect("graceful shutdown must have run");
    assert_eq!(status.reason, "end_of_day_flatten");
}
