use std::time::Duration;

/// Exponential reconnect backoff: base 2, capped at 5 attempts, reset on a
/// successful reconnect (§4.E).
#[derive(Clone, Debug)]
pub struct ReconnectBackoff {
    base: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts, attempt: 0 }
    }

    /// Returns the delay before the next reconnect attempt, or `None` once
    /// `max_attempts` have been exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempt);
        self.attempt += 1;
        Some(self.base * factor)
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_each_attempt() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), 5);
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(4)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(8)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(16)));
        assert_eq!(backoff.next_delay(), None, "must stop after max_attempts");
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), 2);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), None);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
    }
}
