/// Reconnect backoff for client sessions
use std::time::Duration;

use crate::config::ClientConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Reconnect attempts after a drop before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// 1.0 keeps the delay fixed
    pub backoff_multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 1.0,
        }
    }
}

/// Policy advertised by the server's client config endpoint
impl From<&ClientConfig> for ReconnectPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.reconnect_attempts,
            initial_delay: Duration::from_millis(config.reconnect_delay_ms),
            backoff_multiplier: config.reconnect_backoff,
            ..Self::default()
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the 1-based `attempt`, or `None` once attempts are exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32 - 1);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Some(Duration::from_millis(millis as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_five_fixed_one_second_attempts() {
        let policy = ReconnectPolicy::default();
        for attempt in 1..=5 {
            assert_eq!(policy.delay_for(attempt), Some(Duration::from_secs(1)));
        }
        assert_eq!(policy.delay_for(6), None);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_from_advertised_client_config() {
        let advertised = ClientConfig {
            reconnect_attempts: 3,
            reconnect_delay_ms: 250,
            reconnect_backoff: 2.0,
        };
        let policy = ReconnectPolicy::from(&advertised);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(4), None);
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(1), None);
    }
}
