//! Retry policy for job handlers.

use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `attempt` (1-based), or `None` when the
    /// budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig::default()
            .with_max_retries(10)
            .with_base_delay(Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(1), Some(Duration::from_secs(10)));
        assert_eq!(config.delay_for_attempt(2), Some(Duration::from_secs(20)));
        assert_eq!(config.delay_for_attempt(8), Some(Duration::from_secs(60)));
        assert_eq!(config.delay_for_attempt(11), None);
    }

    #[test]
    fn test_zero_retries() {
        let config = RetryConfig::default().with_max_retries(0);
        assert_eq!(config.delay_for_attempt(1), None);
    }
}
