use rust_decimal::Decimal;

/// Deterministic simulator parameters (§4.D / §6). `partial_fill_probability`
/// and `slip_bps` both default to zero, matching the spec's stated paper-
/// broker defaults.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaperBrokerConfig {
    pub slip_bps: Decimal,
    pub partial_fill_probability: f64,
    pub seed: u64,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            slip_bps: Decimal::ZERO,
            partial_fill_probability: 0.0,
            seed: 0,
        }
    }
}
