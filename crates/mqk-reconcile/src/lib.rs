//! Position Reconciler (§4.I): periodic local-vs-broker position drift
//! detection. Halts the Risk Engine on critical (>=10%) drift; never
//! auto-corrects local state to match the broker — that is an operator's
//! call, not this engine's.

mod engine;
mod types;

pub use engine::Reconciler;
pub use types::{DriftEntry, ReconcileReport, DRIFT_EPSILON};
