//! Structured log record + redaction policy (Design Notes §9).
//!
//! Process-wide logging singletons are avoided in the core: every
//! diagnostic is built as a `LogRecord` and handed to an injectable
//! `CoreLogger` rather than printed straight to a global subscriber. Every
//! field is redacted at construction time against a case-insensitive
//! pattern — `account`, `password`, `token`, `secret`, `auth`,
//! `credential`, `api_key`/`api-key` — so a field carrying broker
//! credentials can never reach a log sink unmasked, even though nothing in
//! this crate currently logs one.

use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_FIELD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(account|password|token|secret|auth|credential|api[_-]?key)").unwrap());

pub fn is_secret_field(name: &str) -> bool {
    SECRET_FIELD_PATTERN.is_match(name)
}

/// One structured log line: a set of key/value fields, redacted as they're
/// added. Message and severity are supplied separately to `CoreLogger::log`.
#[derive(Clone, Debug, Default)]
pub struct LogRecord {
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, masking the value if `name` matches the secret pattern.
    pub fn field(mut self, name: impl Into<String>, value: impl std::fmt::Display) -> Self {
        let name = name.into();
        let value = if is_secret_field(&name) { "<REDACTED>".to_string() } else { value.to_string() };
        self.fields.push((name, value));
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Injectable logging target. The default (`TracingLogger`) forwards to
/// the ambient `tracing` subscriber; a test can substitute a spy to assert
/// on emitted records without installing a global subscriber.
pub trait CoreLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, record: &LogRecord);
}

pub struct TracingLogger;

impl CoreLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, record: &LogRecord) {
        let fields = record.fields.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" ");
        match level {
            LogLevel::Info => tracing::info!(%fields, "{message}"),
            LogLevel::Warn => tracing::warn!(%fields, "{message}"),
            LogLevel::Error => tracing::error!(%fields, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn secret_field_names_are_redacted_regardless_of_separator() {
        let record = LogRecord::new()
            .field("api_key", "sk-live-abc123")
            .field("api-key", "sk-live-def456")
            .field("account", "U12345")
            .field("broker_auth_token", "xyz")
            .field("symbol", "AAPL");
        let map: BTreeMap<_, _> = record.fields.into_iter().collect();
        assert_eq!(map["api_key"], "<REDACTED>");
        assert_eq!(map["api-key"], "<REDACTED>");
        assert_eq!(map["account"], "<REDACTED>");
        assert_eq!(map["broker_auth_token"], "<REDACTED>");
        assert_eq!(map["symbol"], "AAPL");
    }

    #[test]
    fn non_secret_fields_pass_through_unmodified() {
        let record = LogRecord::new().field("halt_reason", "daily_loss_limit_breached");
        assert_eq!(record.fields[0].1, "daily_loss_limit_breached");
    }

    #[test]
    fn is_secret_field_is_case_insensitive() {
        assert!(is_secret_field("API_KEY"));
        assert!(is_secret_field("Password"));
        assert!(!is_secret_field("symbol"));
    }
}
