//! Manual stop flag, end-of-day flatten scheduling, and graceful-shutdown
//! liquidation with retry (§4.J). Ported from `aistock/stop_control.py`.

mod calendar;
mod engine;
mod types;

pub use calendar::{MarketCalendar, StandardNyseCalendar};
pub use engine::StopController;
pub use types::{ShutdownOutcome, ShutdownStatus, StopConfig};
