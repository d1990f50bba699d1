//! Deterministic client-order-id generation and crash-safe, time-boxed
//! duplicate-submission tracking.
//!
//! Ported from the original Python `OrderIdempotencyTracker`: restart after
//! a partial order submission must not duplicate orders, but a tracked id
//! must still expire so a genuinely new order for the same symbol/qty isn't
//! blocked forever.

mod types;

pub use types::{IdempotencyError, IdempotencyFileV2, SubmittedIdRecord, SCHEMA_VERSION};

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sha1::{Digest, Sha1};

pub struct OrderIdempotencyTracker {
    storage_path: PathBuf,
    expiration_ms: i64,
    submitted_ids: BTreeMap<String, i64>,
}

impl OrderIdempotencyTracker {
    /// `expiration_minutes` defaults to 5 in the original system; callers
    /// should pass the config value rather than relying on a hardcoded default.
    pub fn new(storage_path: impl Into<PathBuf>, expiration_minutes: i64) -> Self {
        let mut tracker = Self {
            storage_path: storage_path.into(),
            expiration_ms: expiration_minutes * 60 * 1000,
            submitted_ids: BTreeMap::new(),
        };
        tracker.load_from_disk();
        tracker.clear_stale_ids(Utc::now());
        tracker
    }

    fn backup_path(&self) -> PathBuf {
        self.storage_path.with_extension("backup")
    }

    fn tmp_path(&self) -> PathBuf {
        self.storage_path.with_extension("tmp")
    }

    fn load_from_disk(&mut self) {
        let primary = std::fs::read_to_string(&self.storage_path).ok();
        let backup_path = self.backup_path();

        let (raw, restored_from_backup) = match primary {
            Some(text) => (Some(text), false),
            None => (std::fs::read_to_string(&backup_path).ok(), true),
        };

        let Some(raw) = raw else { return };
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            return;
        };
        let Some(obj) = value.as_object() else { return };

        self.submitted_ids.clear();

        match obj.get("submitted_ids") {
            Some(Value::Array(items)) if matches!(items.first(), Some(Value::Object(_))) => {
                for item in items {
                    let Some(entry) = item.as_object() else { continue };
                    let (Some(id), Some(ts)) = (
                        entry.get("id").and_then(Value::as_str),
                        entry.get("timestamp_ms").and_then(Value::as_i64),
                    ) else {
                        continue;
                    };
                    self.submitted_ids.insert(id.to_string(), ts);
                }
            }
            Some(Value::Array(items)) => {
                // Legacy v1: a bare list of ids with no timestamps.
                for item in items {
                    if let Some(id) = item.as_str() {
                        let ts = Self::extract_timestamp_ms(id);
                        self.submitted_ids.insert(id.to_string(), ts);
                    }
                }
            }
            _ => {}
        }

        if restored_from_backup && !self.submitted_ids.is_empty() {
            let _ = self.write_locked();
        }
    }

    fn write_locked(&self) -> Result<(), IdempotencyError> {
        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut records: Vec<SubmittedIdRecord> = self
            .submitted_ids
            .iter()
            .map(|(id, ts)| SubmittedIdRecord {
                id: id.clone(),
                timestamp_ms: *ts,
            })
            .collect();
        records.sort_by(|a, b| (a.timestamp_ms, &a.id).cmp(&(b.timestamp_ms, &b.id)));

        let payload = IdempotencyFileV2 {
            version: SCHEMA_VERSION,
            submitted_ids: records,
            last_updated: Utc::now(),
        };

        let tmp_path = self.tmp_path();
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(serde_json::to_string_pretty(&payload)?.as_bytes())?;
        }

        if self.storage_path.exists() {
            std::fs::rename(&self.storage_path, self.backup_path())?;
        }
        std::fs::rename(&tmp_path, &self.storage_path)?;
        Ok(())
    }

    fn normalize_quantity(quantity: Option<Decimal>) -> String {
        match quantity {
            None => "0".to_string(),
            Some(q) if q.is_zero() => q.to_string(),
            Some(q) => q.normalize().to_string(),
        }
    }

    fn extract_timestamp_ms(client_order_id: &str) -> i64 {
        client_order_id
            .split('_')
            .nth(1)
            .and_then(|part| part.parse::<i64>().ok())
            .unwrap_or(0)
    }

    /// `SYMBOL_<epoch-ms>_<first-12-hex-of-sha1("SYMBOL|ts_ms|normalized_qty")>`.
    pub fn generate_client_order_id(symbol: &str, ts: DateTime<Utc>, quantity: Option<Decimal>) -> String {
        let symbol_upper = symbol.to_uppercase();
        let ts_ms = ts.timestamp_millis();
        let qty_str = Self::normalize_quantity(quantity);
        let payload = format!("{symbol_upper}|{ts_ms}|{qty_str}");

        let mut hasher = Sha1::new();
        hasher.update(payload.as_bytes());
        let digest = hasher.finalize();
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();

        format!("{symbol_upper}_{ts_ms}_{}", &hex[..12])
    }

    /// Fresh iff `client_order_id` is tracked and `now - submitted_at < expiration`.
    /// Strictly `<`, matching the original: an id at exactly the expiration
    /// boundary is no longer a duplicate.
    pub fn is_duplicate(&self, client_order_id: &str, now: DateTime<Utc>) -> bool {
        match self.submitted_ids.get(client_order_id) {
            None => false,
            Some(submitted_ts_ms) => {
                let age_ms = now.timestamp_millis() - submitted_ts_ms;
                age_ms < self.expiration_ms
            }
        }
    }

    /// Record acceptance. Uses the actual wall-clock submission time — not
    /// bar time — so replayed/backfilled bars can't corrupt TTL behavior.
    /// Call this only after the broker has confirmed the submission.
    pub fn mark_submitted(&mut self, client_order_id: impl Into<String>, submitted_at: DateTime<Utc>) -> Result<(), IdempotencyError> {
        self.submitted_ids.insert(client_order_id.into(), submitted_at.timestamp_millis());
        self.write_locked()
    }

    /// Rollback path: used when `broker.submit()` fails after `mark_submitted`
    /// was already (wrongly) called, or for test setup.
    pub fn clear_submitted(&mut self, client_order_id: &str) -> Result<(), IdempotencyError> {
        if self.submitted_ids.remove(client_order_id).is_some() {
            self.write_locked()?;
        }
        Ok(())
    }

    /// Remove every entry older than `expiration_ms`. Called on startup to
    /// recover from a crash between `submit()` and `mark_submitted()`.
    pub fn clear_stale_ids(&mut self, now: DateTime<Utc>) -> usize {
        let now_ms = now.timestamp_millis();
        let stale: Vec<String> = self
            .submitted_ids
            .iter()
            .filter(|(_, ts)| now_ms - **ts >= self.expiration_ms)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.submitted_ids.remove(id);
        }
        if !stale.is_empty() {
            let _ = self.write_locked();
        }
        stale.len()
    }

    /// Bound unbounded growth: keep only the most recent `retention_count`
    /// entries by (timestamp, id) order.
    pub fn clear_old_ids(&mut self, retention_count: usize) -> Result<(), IdempotencyError> {
        if self.submitted_ids.len() <= retention_count {
            return Ok(());
        }
        let mut items: Vec<(String, i64)> = self.submitted_ids.iter().map(|(k, v)| (k.clone(), *v)).collect();
        items.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));
        let keep_from = items.len() - retention_count;
        self.submitted_ids = items.into_iter().skip(keep_from).collect();
        self.write_locked()
    }

    pub fn count_submitted(&self) -> usize {
        self.submitted_ids.len()
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }
}
