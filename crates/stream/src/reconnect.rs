use std::time::Duration;

use crate::config::StreamConfig;

/// Outcome of an unplanned close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect after `delay`; `attempt` is 1-based
    Retry { attempt: u32, delay: Duration },
    /// Attempt budget spent, stop retrying
    Exhausted { max_attempts: u32 },
}

/// Fixed-delay reconnect policy with a bounded attempt budget.
///
/// The counter only resets on a successful open, so a run of failed
/// handshakes draws from the same budget.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            attempts: 0,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.max_reconnect_attempts, config.reconnect_interval())
    }

    pub fn on_unplanned_close(&mut self) -> ReconnectDecision {
        if self.attempts < self.max_attempts {
            self.attempts += 1;
            ReconnectDecision::Retry {
                attempt: self.attempts,
                delay: self.delay,
            }
        } else {
            ReconnectDecision::Exhausted {
                max_attempts: self.max_attempts,
            }
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_until_exhausted() {
        let mut policy = ReconnectPolicy::new(3, Duration::from_millis(3000));

        for expected in 1..=3 {
            assert_eq!(
                policy.on_unplanned_close(),
                ReconnectDecision::Retry {
                    attempt: expected,
                    delay: Duration::from_millis(3000),
                }
            );
        }

        assert_eq!(
            policy.on_unplanned_close(),
            ReconnectDecision::Exhausted { max_attempts: 3 }
        );
        // stays exhausted
        assert_eq!(
            policy.on_unplanned_close(),
            ReconnectDecision::Exhausted { max_attempts: 3 }
        );
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut policy = ReconnectPolicy::new(2, Duration::from_secs(1));
        policy.on_unplanned_close();
        policy.on_unplanned_close();
        policy.reset();

        assert_eq!(policy.attempts(), 0);
        assert!(matches!(
            policy.on_unplanned_close(),
            ReconnectDecision::Retry { attempt: 1, .. }
        ));
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let mut policy = ReconnectPolicy::new(0, Duration::from_secs(1));
        assert_eq!(
            policy.on_unplanned_close(),
            ReconnectDecision::Exhausted { max_attempts: 0 }
        );
    }

    #[test]
    fn test_from_config_defaults() {
        let policy = ReconnectPolicy::from_config(&StreamConfig::default());
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.delay(), Duration::from_millis(3000));
    }
}
