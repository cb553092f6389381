//! Reconnection backoff

use crate::config::ReconnectConfig;
use std::time::Duration;

/// Reconnection state for the process-level connect loop
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Number of consecutive failed attempts
    pub attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            attempts: 0,
            base_delay: Duration::from_secs(config.initial_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }

    /// Delay before the next attempt: base * 2^attempts, capped at the maximum.
    /// Records the attempt.
    pub fn next_delay(&mut self) -> Duration {
        // Cap power at 10 to prevent overflow
        let factor = 2_u32.pow(self.attempts.min(10));
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Record how long a registered session lasted. Only a session that
    /// outlived the longest delay counts as stable and restarts the backoff.
    pub fn session_ended(&mut self, uptime: Duration) {
        if uptime >= self.max_delay {
            self.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_is_capped() {
        let mut backoff = Backoff::new(&ReconnectConfig {
            initial_delay_secs: 5,
            max_delay_secs: 60,
        });

        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60]);
        assert_eq!(backoff.attempts, 6);

        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(60));
        }
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = Backoff::new(&ReconnectConfig::default());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_short_sessions_keep_growing() {
        let mut backoff = Backoff::new(&ReconnectConfig {
            initial_delay_secs: 1,
            max_delay_secs: 8,
        });

        let mut delays = Vec::new();
        for _ in 0..4 {
            backoff.session_ended(Duration::from_millis(50));
            delays.push(backoff.next_delay().as_secs());
        }
        assert_eq!(delays, vec![1, 2, 4, 8]);

        backoff.session_ended(Duration::from_secs(8));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
