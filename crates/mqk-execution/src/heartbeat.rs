use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Tracks the last observed bar/heartbeat arrival and flags a reconnect
/// once the silence exceeds the idle threshold (default 120s, §4.E).
pub struct HeartbeatMonitor {
    idle_threshold: Duration,
    last_seen: Mutex<DateTime<Utc>>,
}

impl HeartbeatMonitor {
    pub fn new(now: DateTime<Utc>, idle_threshold: Duration) -> Self {
        Self { idle_threshold, last_seen: Mutex::new(now) }
    }

    pub fn default_at(now: DateTime<Utc>) -> Self {
        Self::new(now, Duration::from_secs(120))
    }

    pub fn touch(&self, now: DateTime<Utc>) {
        *self.last_seen.lock().expect("heartbeat mutex poisoned") = now;
    }

    pub fn is_idle(&self, now: DateTime<Utc>) -> bool {
        let last_seen = *self.last_seen.lock().expect("heartbeat mutex poisoned");
        let elapsed = (now - last_seen).to_std().unwrap_or(Duration::ZERO);
        elapsed > self.idle_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn not_idle_before_threshold() {
        let t0 = Utc::now();
        let monitor = HeartbeatMonitor::default_at(t0);
        assert!(!monitor.is_idle(t0 + ChronoDuration::seconds(119)));
    }

    #[test]
    fn idle_after_threshold() {
        let t0 = Utc::now();
        let monitor = HeartbeatMonitor::default_at(t0);
        assert!(monitor.is_idle(t0 + ChronoDuration::seconds(121)));
    }

    #[test]
    fn touch_resets_the_clock() {
        let t0 = Utc::now();
        let monitor = HeartbeatMonitor::default_at(t0);
        let t1 = t0 + ChronoDuration::seconds(100);
        monitor.touch(t1);
        assert!(!monitor.is_idle(t1 + ChronoDuration::seconds(100)));
        assert!(monitor.is_idle(t1 + ChronoDuration::seconds(121)));
    }
}
