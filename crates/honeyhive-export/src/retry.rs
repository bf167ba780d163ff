use std::time::Duration;

use rand::Rng;

/// Exponential backoff with full jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base: Duration::from_millis(250),
            cap: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based). A server-provided
    /// `Retry-After` seeds the delay floor instead of the computed ceiling.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(after) = retry_after {
            return after.min(self.cap);
        }
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.cap);
        // Full jitter: uniform in [0, exp].
        let max_ms = exp.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_bounded_by_cap() {
        let policy = RetryPolicy {
            max_attempts: 8,
            base: Duration::from_millis(100),
            cap: Duration::from_secs(2),
        };
        for attempt in 1..=8 {
            assert!(policy.delay(attempt, None) <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_retry_after_seeds_delay() {
        let policy = RetryPolicy::default();
        let delay = policy.delay(1, Some(Duration::from_secs(3)));
        assert_eq!(delay, Duration::from_secs(3));
        // Retry-After beyond the cap is clamped.
        let delay = policy.delay(1, Some(Duration::from_secs(60)));
        assert_eq!(delay, policy.cap);
    }
}
