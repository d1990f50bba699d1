mod io;
mod types;
mod worker;

pub use io::{load_with_backup, save_atomic};
pub use types::{
    CheckpointError, CheckpointSnapshot, PortfolioSnapshot, PositionSnapshot, RiskSnapshot,
};
pub use worker::Checkpointer;
