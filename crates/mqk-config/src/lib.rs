//! The core's configuration surface: one plain, serde-derived struct holding
//! every option spec §6 enumerates, grouped exactly as that table groups
//! them. Loading config from YAML/env, hashing it, and enforcing which keys
//! a given run mode may consume are all out of scope for the core — that
//! machinery lives in the (out-of-scope) CLI/config-loading layer. This
//! crate only carries the shape the core's constructors accept.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Bar-history deque capacity target is `5 * warmup_bars` (§4.F).
    pub warmup_bars: usize,
    /// Skip bars whose timestamp falls outside exchange hours (§4.K step 5).
    pub enforce_trading_hours: bool,
    /// Drives exchange-calendar queries (regular/early-close hours).
    pub exchange: String,
    pub allow_extended_hours: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            warmup_bars: 50,
            enforce_trading_hours: true,
            exchange: "XNYS".to_string(),
            allow_extended_hours: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_equity: Decimal,
    pub commission_per_trade: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_equity: Decimal::new(100_000, 0),
            commission_per_trade: Decimal::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskSectionConfig {
    pub max_position_fraction: Decimal,
    pub per_symbol_notional_cap: Decimal,
    pub max_single_position_units: Decimal,
    pub max_daily_loss: Decimal,
    pub max_drawdown: Decimal,
    pub max_orders_per_minute: u32,
    pub max_orders_per_day: u32,
}

impl Default for RiskSectionConfig {
    fn default() -> Self {
        let defaults = mqk_risk::RiskConfig::sane_defaults();
        Self {
            max_position_fraction: defaults.max_position_fraction,
            per_symbol_notional_cap: defaults.per_symbol_notional_cap,
            max_single_position_units: defaults.max_single_position_units,
            max_daily_loss: defaults.max_daily_loss,
            max_drawdown: defaults.max_drawdown,
            max_orders_per_minute: defaults.max_orders_per_minute,
            max_orders_per_day: defaults.max_orders_per_day,
        }
    }
}

impl From<&RiskSectionConfig> for mqk_risk::RiskConfig {
    fn from(cfg: &RiskSectionConfig) -> Self {
        mqk_risk::RiskConfig {
            per_symbol_notional_cap: cfg.per_symbol_notional_cap,
            max_position_fraction: cfg.max_position_fraction,
            max_single_position_units: cfg.max_single_position_units,
            max_orders_per_minute: cfg.max_orders_per_minute,
            max_orders_per_day: cfg.max_orders_per_day,
            max_daily_loss: cfg.max_daily_loss,
            max_drawdown: cfg.max_drawdown,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Paper-broker slippage, in basis points. Default 0 per §6.
    pub slip_bps_limit: Decimal,
    /// Paper-broker partial-fill probability in `[0, 1]`. Default 0 per §6.
    pub partial_fill_probability: f64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            slip_bps_limit: Decimal::ZERO,
            partial_fill_probability: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdemConfig {
    /// Dedup freshness window. Default 5 minutes per §4.A.
    pub expiration_minutes: i64,
}

impl Default for IdemConfig {
    fn default() -> Self {
        Self { expiration_minutes: 5 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopConfig {
    pub enable_manual_stop: bool,
    pub enable_eod_flatten: bool,
    /// Flatten target in the exchange's local civil time (e.g. 15:45 ET).
    pub eod_flatten_time_et: NaiveTime,
    pub emergency_liquidation_timeout_secs: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            enable_manual_stop: true,
            enable_eod_flatten: false,
            eod_flatten_time_et: NaiveTime::from_hms_opt(15, 45, 0).expect("valid time"),
            emergency_liquidation_timeout_secs: 30.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub interval_minutes: i64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { interval_minutes: 60 }
    }
}

/// Every configuration option the core recognizes (spec §6), grouped the
/// same way that table groups them. Round-trips through serde for
/// convenience (checkpoints and tests); loading this from files/env is the
/// caller's responsibility, out of scope for the core.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub data: DataConfig,
    pub engine: EngineConfig,
    pub risk: RiskSectionConfig,
    pub exec: ExecConfig,
    pub idem: IdemConfig,
    pub stop: StopConfig,
    pub reconcile: ReconcileConfig,
}
