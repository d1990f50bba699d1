use chrono::NaiveTime;
use rust_decimal::Decimal;

/// Configuration for stop control (spec §4.J).
#[derive(Clone, Debug, PartialEq)]
pub struct StopConfig {
    pub enable_manual_stop: bool,
    pub enable_eod_flatten: bool,
    /// Configured flatten time, ET, on a regular (16:00 close) trading day.
    pub eod_flatten_time_et: NaiveTime,
    pub emergency_liquidation_timeout: std::time::Duration,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            enable_manual_stop: true,
            enable_eod_flatten: false,
            eod_flatten_time_et: NaiveTime::from_hms_opt(15, 45, 0).unwrap(),
            emergency_liquidation_timeout: std::time::Duration::from_secs(30),
        }
    }
}

/// Outcome of `execute_graceful_shutdown` (spec §4.J step 5).
#[derive(Clone, Debug, PartialEq)]
pub struct ShutdownStatus {
    pub outcome: ShutdownOutcome,
    pub fully_closed: Vec<String>,
    pub partially_closed: std::collections::BTreeMap<String, Decimal>,
    pub failed: Vec<String>,
    pub orders_cancelled: usize,
    pub retry_attempts: u32,
    pub total_wait_time: std::time::Duration,
    pub reason: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Success,
    Partial,
    Failed,
}
