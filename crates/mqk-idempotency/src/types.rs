use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 2;

/// On-disk record for a single tracked client order id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmittedIdRecord {
    pub id: String,
    pub timestamp_ms: i64,
}

/// The persisted file, version 2. `submitted_ids` is a list rather than a
/// map so the write path can emit them in stable (timestamp, id) order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdempotencyFileV2 {
    pub version: u32,
    pub submitted_ids: Vec<SubmittedIdRecord>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("i/o error persisting idempotency state: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize idempotency state: {0}")]
    Serialize(#[from] serde_json::Error),
}
