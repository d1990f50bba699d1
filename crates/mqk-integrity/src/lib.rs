//! Fail-closed arm/disarm state for the trading core.
//!
//! The Risk Engine (`mqk-risk`) owns the steady-state halt flag and its
//! reason; `ArmState` is the boot-time idiom layered on top of it — the
//! core always starts disarmed on restart, independent of whatever the risk
//! state was when it last persisted, and requires an explicit operator
//! `arm()` before the Coordinator will submit its first order.

mod arm_state;

pub use arm_state::{ArmState, DisarmReason};
