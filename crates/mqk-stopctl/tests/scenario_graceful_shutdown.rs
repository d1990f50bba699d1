use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use mqk_execution::{BrokerAdapter, BrokerError, FillHandler, OrderRequest, SubscriptionId};
use mqk_portfolio::{apply_fill, Fill, PortfolioState};
use mqk_stopctl::{ShutdownOutcome, StopConfig, StopController};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// A broker test double that fills every liquidation order immediately
/// against the shared portfolio, so the shutdown sequence's monitor-fills
/// loop observes a flat position on its first poll.
struct ImmediateFillBroker<'a> {
    portfolio: &'a Mutex<PortfolioState>,
}

#[async_trait]
impl<'a> BrokerAdapter for ImmediateFillBroker<'a> {
    async fn start(&self) -> Result<(), BrokerError> {
        Ok(())
    }
    async fn stop(&self) -> Result<(), BrokerError> {
        Ok(())
    }
    async fn submit(&self, order: OrderRequest) -> Result<String, BrokerError> {
        let signed_qty = order.qty * Decimal::from(order.side.sign());
        let mut guard = self.portfolio.lock().unwrap();
        apply_fill(
            &mut guard,
            Fill::new(order.symbol.clone(), signed_qty, dec!(100), dec!(0), Utc::now()),
        );
        Ok(order.client_order_id)
    }
    async fn cancel(&self, _broker_order_id: &str) -> Result<bool, BrokerError> {
        Ok(true)
    }
    async fn cancel_all(&self) -> Result<usize, BrokerError> {
        Ok(2)
    }
    async fn get_positions(&self) -> Result<BTreeMap<String, (Decimal, Decimal)>, BrokerError> {
        Ok(BTreeMap::new())
    }
    async fn subscribe_bars(&self, _symbol: &str, _bar_size_secs: i64) -> Result<SubscriptionId, BrokerError> {
        Ok(SubscriptionId(0))
    }
    async fn unsubscribe(&self, _sub_id: SubscriptionId) -> Result<(), BrokerError> {
        Ok(())
    }
    fn set_fill_handler(&self, _handler: FillHandler) {}
}

/// A broker test double that never fills anything, to exercise the
/// retry-then-fail path.
struct StuckBroker;

#[async_trait]
impl BrokerAdapter for StuckBroker {
    async fn start(&self) -> Result<(), BrokerError> {
        Ok(())
    }
    async fn stop(&self) -> Result<(), BrokerError> {
        Ok(())
    }
    async fn submit(&self, order: OrderRequest) -> Result<String, BrokerError> {
        Ok(order.client_order_id)
    }
    async fn cancel(&self, _broker_order_id: &str) -> Result<bool, BrokerError> {
        Ok(true)
    }
    async fn cancel_all(&self) -> Result<usize, BrokerError> {
        Ok(0)
    }
    async fn get_positions(&self) -> Result<BTreeMap<String, (Decimal, Decimal)>, BrokerError> {
        Ok(BTreeMap::new())
    }
    async fn subscribe_bars(&self, _symbol: &str, _bar_size_secs: i64) -> Result<SubscriptionId, BrokerError> {
        Ok(SubscriptionId(0))
    }
    async fn unsubscribe(&self, _sub_id: SubscriptionId) -> Result<(), BrokerError> {
        Ok(())
    }
    fn set_fill_handler(&self, _handler: FillHandler) {}
}

#[tokio::test]
async fn graceful_shutdown_closes_every_position_and_reports_success() {
    let mut state = PortfolioState::new(dec!(10000));
    apply_fill(&mut state, Fill::new("AAPL", dec!(10), dec!(150), dec!(0), Utc::now()));
    apply_fill(&mut state, Fill::new("MSFT", dec!(-5), dec!(300), dec!(0), Utc::now()));
    let portfolio = Mutex::new(state);

    let broker = ImmediateFillBroker { portfolio: &portfolio };
    let ctl = StopController::new(StopConfig {
        emergency_liquidation_timeout: std::time::Duration::from_millis(500),
        ..StopConfig::default()
    });
    ctl.request_stop("manual");

    let status = ctl.execute_graceful_shutdown(&broker, &portfolio).await;

    assert_eq!(status.outcome, ShutdownOutcome::Success);
    assert!(status.partially_closed.is_empty());
    assert_eq!(status.orders_cancelled, 2);
    assert_eq!(status.reason, "manual");
    assert_eq!(portfolio.lock().unwrap().position("AAPL").unwrap().quantity, dec!(0));
    assert_eq!(portfolio.lock().unwrap().position("MSFT").unwrap().quantity, dec!(0));
}

#[tokio::test]
async fn shutdown_against_a_broker_that_never_fills_reports_failed_after_retries() {
    let mut state = PortfolioState::new(dec!(10000));
    apply_fill(&mut state, Fill::new("AAPL", dec!(10), dec!(150), dec!(0), Utc::now()));
    let portfolio = Mutex::new(state);

    let broker = StuckBroker;
    let ctl = StopController::new(StopConfig {
        emergency_liquidation_timeout: std::time::Duration::from_millis(50),
        ..StopConfig::default()
    });
    ctl.request_stop("emergency");

    let status = ctl.execute_graceful_shutdown(&broker, &portfolio).await;

    assert_eq!(status.outcome, ShutdownOutcome::Failed);
    assert_eq!(status.retry_attempts, 3);
    assert!(status.failed.contains(&"AAPL".to_string()));
}
