//! The Trading Coordinator (§4.K/§5): wires the Bar Processor, Decision
//! Engine, Risk Engine, Portfolio, Idempotency Tracker, Checkpointer,
//! Reconciler, Stop Controller, and Arm State together into the single
//! per-bar pipeline and fill handler. Every other crate in this workspace
//! is a pure, independently-testable component; this one is the glue.

mod coordinator;
mod redact;
mod types;

pub use coordinator::TradingCoordinator;
pub use redact::{CoreLogger, LogLevel, LogRecord, TracingLogger};
pub use types::{CoordinatorError, EquityPoint, NoopWithdrawalHook, TradeLogEntry, WithdrawalHook};
