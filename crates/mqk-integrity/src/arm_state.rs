//! Arm state with fail-closed boot semantics.
//!
//! # Invariants
//!
//! - **Boot is always fail-closed**: the system starts DISARMED on every
//!   restart, regardless of what the last persisted state was. A previously
//!   armed state is NOT trusted; explicit re-arm is required every session.
//!
//! - **Disarm reason is preserved across restart**: when a halt condition
//!   triggered the disarm, that reason survives in the persisted record so
//!   operators can identify the cause before re-arming.
//!
//! - **Explicit arm is the only escape**: `ArmState::arm()` is the sole path
//!   to `Armed`. Nothing in this core auto-arms.
//!
//! Pure deterministic logic — no IO, no clock, no randomness.

/// The reason the system is disarmed. Preserved in persistence so operators
/// know why a re-arm is required.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisarmReason {
    /// System booted without a previously armed state — fail-closed default.
    BootDefault,
    /// Operator explicitly disarmed the system.
    ManualDisarm,
    /// Risk engine halted (daily loss, drawdown, or a forced halt such as a
    /// critical reconciliation mismatch — see `mqk-risk::force_halt`).
    RiskHalt { reason: String },
}

/// The core's top-level arm state. On every boot, `ArmState::boot`
/// determines the starting state (always DISARMED — see invariants above).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArmState {
    /// Armed — the Coordinator is permitted to submit orders (subject to
    /// the Risk Engine's own pre-trade checks).
    Armed,
    /// Disarmed — order submission is blocked regardless of risk state.
    Disarmed { reason: DisarmReason },
}

impl ArmState {
    /// Fail-closed boot semantics.
    ///
    /// | Persisted state              | Boot result                        |
    /// |-------------------------------|------------------------------------|
    /// | `None` (no record)            | `Disarmed { BootDefault }`          |
    /// | `Some(Armed)`                  | `Disarmed { BootDefault }`          |
    /// | `Some(Disarmed { reason })`    | `Disarmed { reason }` (preserved)   |
    ///
    /// The system never auto-arms from a persisted `Armed` state; re-arm
    /// always requires explicit operator action after each restart.
    pub fn boot(persisted: Option<ArmState>) -> Self {
        match persisted {
            None => ArmState::Disarmed { reason: DisarmReason::BootDefault },
            Some(ArmState::Armed) => ArmState::Disarmed { reason: DisarmReason::BootDefault },
            Some(d @ ArmState::Disarmed { .. }) => d,
        }
    }

    /// Explicit operator arm. Callers are responsible for having checked
    /// whatever gate (reconciliation, risk halt clearance) precedes a
    /// re-arm; this function does not re-verify anything.
    pub fn arm() -> Self {
        ArmState::Armed
    }

    pub fn manual_disarm() -> Self {
        ArmState::Disarmed { reason: DisarmReason::ManualDisarm }
    }

    pub fn risk_halt(reason: impl Into<String>) -> Self {
        ArmState::Disarmed { reason: DisarmReason::RiskHalt { reason: reason.into() } }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, ArmState::Armed)
    }

    pub fn is_disarmed(&self) -> bool {
        !self.is_armed()
    }
}
