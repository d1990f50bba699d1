//! Deterministic paper-broker fill simulator (§4.D).
//!
//! Implements the `BrokerAdapter` contract (§4.E) so the Coordinator can
//! drive it exactly like a real broker, plus a `process_bar` entry point a
//! backtest/test harness uses to feed bars and trigger fill simulation.
//! Positions tracked here are diagnostic only (for reconciler tests) — the
//! Portfolio is always the accounting source of truth.

mod types;

pub use types::PaperBrokerConfig;

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mqk_bars::Bar;
use mqk_execution::{
    BrokerAdapter, BrokerError, ExecutionReport, FillHandler, OrderKind, OrderRequest, OrderState, Side,
    SubscriptionId,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rust_decimal::Decimal;

const MIN_PARTIAL_FILL_QTY: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

#[derive(Clone, Debug)]
struct TrackedOrder {
    request: OrderRequest,
    filled_qty: Decimal,
    state: OrderState,
}

struct Inner {
    config: PaperBrokerConfig,
    orders: BTreeMap<String, TrackedOrder>,
    positions: BTreeMap<String, (Decimal, Decimal)>,
    fill_handler: Option<FillHandler>,
    rng: Pcg64,
    next_sub_id: u64,
}

pub struct PaperBroker {
    inner: Mutex<Inner>,
}

impl PaperBroker {
    pub fn new(config: PaperBrokerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rng: Pcg64::seed_from_u64(config.seed),
                config,
                orders: BTreeMap::new(),
                positions: BTreeMap::new(),
                fill_handler: None,
                next_sub_id: 0,
            }),
        }
    }

    /// `broker_order_id` is exactly `client_order_id`: deterministic and
    /// idempotent on repeated submission of the same id.
    pub fn submit(&self, order: OrderRequest) -> String {
        let mut inner = self.inner.lock().expect("paper broker mutex poisoned");
        let id = order.client_order_id.clone();
        inner.orders.entry(id.clone()).or_insert_with(|| TrackedOrder {
            request: order,
            filled_qty: Decimal::ZERO,
            state: OrderState::Submitted,
        });
        id
    }

    pub fn cancel(&self, broker_order_id: &str) -> bool {
        let mut inner = self.inner.lock().expect("paper broker mutex poisoned");
        match inner.orders.get(broker_order_id).map(|o| o.state) {
            Some(OrderState::Submitted) | Some(OrderState::PartiallyFilled) => {
                inner.orders.remove(broker_order_id);
                true
            }
            _ => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let mut inner = self.inner.lock().expect("paper broker mutex poisoned");
        let ids: Vec<String> = inner
            .orders
            .iter()
            .filter(|(_, o)| matches!(o.state, OrderState::Submitted | OrderState::PartiallyFilled))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            inner.orders.remove(id);
        }
        ids.len()
    }

    pub fn positions(&self) -> BTreeMap<String, (Decimal, Decimal)> {
        self.inner.lock().expect("paper broker mutex poisoned").positions.clone()
    }

    pub fn open_order_count(&self) -> usize {
        self.inner.lock().expect("paper broker mutex poisoned").orders.len()
    }

    /// Feed one bar and simulate fills against every open order for that
    /// symbol. Returns the reports generated (also delivered to the
    /// installed fill handler, if any, after the internal lock is released).
    pub fn process_bar(&self, bar: &Bar, ts: DateTime<Utc>) -> Vec<ExecutionReport> {
        let mut reports = Vec::new();
        let handler = {
            let mut inner = self.inner.lock().expect("paper broker mutex poisoned");
            let candidate_ids: Vec<String> = inner
                .orders
                .iter()
                .filter(|(_, o)| {
                    o.request.symbol == bar.symbol
                        && matches!(o.state, OrderState::Submitted | OrderState::PartiallyFilled)
                })
                .map(|(id, _)| id.clone())
                .collect();

            for id in candidate_ids {
                let slip_bps = inner.config.slip_bps;
                let partial_fill_probability = inner.config.partial_fill_probability;
                let fill_price = {
                    let order = &inner.orders[&id];
                    match determine_fill_price(&order.request, bar, slip_bps) {
                        Some(p) => p,
                        None => continue,
                    }
                };
                let remaining = {
                    let order = &inner.orders[&id];
                    order.request.qty - order.filled_qty
                };
                if remaining <= Decimal::ZERO {
                    continue;
                }
                let fill_qty = determine_fill_qty(&mut inner.rng, partial_fill_probability, remaining);

                let order = inner.orders.get_mut(&id).expect("order id known above");
                order.filled_qty += fill_qty;
                let remaining_after = order.request.qty - order.filled_qty;
                let is_partial = remaining_after > Decimal::ZERO;
                order.state = if is_partial { OrderState::PartiallyFilled } else { OrderState::Filled };

                let report = ExecutionReport {
                    broker_order_id: id.clone(),
                    symbol: order.request.symbol.clone(),
                    side: order.request.side,
                    qty: fill_qty,
                    price: fill_price,
                    ts,
                    is_partial,
                    cumulative_filled: order.filled_qty,
                    remaining: remaining_after,
                };

                let signed_qty = fill_qty * Decimal::from(order.request.side.sign());
                apply_position(&mut inner.positions, &report.symbol, signed_qty, fill_price);

                if remaining_after.is_zero() {
                    inner.orders.remove(&id);
                }
                reports.push(report);
            }
            inner.fill_handler.clone()
        };

        if let Some(handler) = handler {
            for report in &reports {
                handler(report.clone());
            }
        }
        reports
    }
}

fn determine_fill_price(order: &OrderRequest, bar: &Bar, slip_bps: Decimal) -> Option<Decimal> {
    let slip = bar.close * slip_bps / Decimal::from(10_000);
    match order.kind {
        OrderKind::Market => Some(match order.side {
            Side::Buy => bar.close + slip,
            Side::Sell => bar.close - slip,
        }),
        OrderKind::Limit { limit } => match order.side {
            Side::Buy if bar.low <= limit => Some(bar.close.min(limit)),
            Side::Sell if bar.high >= limit => Some(bar.close.max(limit)),
            _ => None,
        },
        OrderKind::Stop { stop } => match order.side {
            Side::Buy if bar.high >= stop => Some(bar.close + slip),
            Side::Sell if bar.low <= stop => Some(bar.close - slip),
            _ => None,
        },
    }
}

fn determine_fill_qty(rng: &mut Pcg64, partial_fill_probability: f64, remaining: Decimal) -> Decimal {
    if partial_fill_probability <= 0.0 || !(rng.gen::<f64>() < partial_fill_probability) {
        return remaining;
    }
    let fraction = rng.gen_range(0.2..=0.8);
    let fraction_dec = Decimal::from_f64_retain(fraction).unwrap_or(Decimal::new(5, 1));
    (remaining * fraction_dec).max(MIN_PARTIAL_FILL_QTY).min(remaining)
}

fn apply_position(positions: &mut BTreeMap<String, (Decimal, Decimal)>, symbol: &str, signed_qty: Decimal, price: Decimal) {
    let entry = positions.entry(symbol.to_string()).or_insert((Decimal::ZERO, Decimal::ZERO));
    let (q, p) = *entry;
    if q.is_zero() {
        *entry = (signed_qty, price);
    } else if q.signum() == signed_qty.signum() {
        let denom = q.abs() + signed_qty.abs();
        let new_avg = (q.abs() * p + signed_qty.abs() * price) / denom;
        *entry = (q + signed_qty, new_avg);
    } else {
        let new_q = q + signed_qty;
        *entry = if new_q.is_zero() {
            (Decimal::ZERO, Decimal::ZERO)
        } else if new_q.signum() == q.signum() {
            (new_q, p)
        } else {
            (new_q, price)
        };
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    async fn start(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn submit(&self, order: OrderRequest) -> Result<String, BrokerError> {
        Ok(PaperBroker::submit(self, order))
    }

    async fn cancel(&self, broker_order_id: &str) -> Result<bool, BrokerError> {
        Ok(PaperBroker::cancel(self, broker_order_id))
    }

    async fn cancel_all(&self) -> Result<usize, BrokerError> {
        Ok(PaperBroker::cancel_all(self))
    }

    async fn get_positions(&self) -> Result<BTreeMap<String, (Decimal, Decimal)>, BrokerError> {
        Ok(PaperBroker::positions(self))
    }

    async fn subscribe_bars(&self, _symbol: &str, _bar_size_secs: i64) -> Result<SubscriptionId, BrokerError> {
        // The paper broker never pulls its own market data: bars arrive via
        // `process_bar`, driven by whatever feeds the Coordinator. A
        // subscription handle is still issued so call sites written against
        // a real adapter work unmodified.
        let mut inner = self.inner.lock().expect("paper broker mutex poisoned");
        let id = inner.next_sub_id;
        inner.next_sub_id += 1;
        Ok(SubscriptionId(id))
    }

    async fn unsubscribe(&self, _sub_id: SubscriptionId) -> Result<(), BrokerError> {
        Ok(())
    }

    fn set_fill_handler(&self, handler: FillHandler) {
        self.inner.lock().expect("paper broker mutex poisoned").fill_handler = Some(handler);
    }
}
