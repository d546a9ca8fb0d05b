//! Bounded exponential backoff for stream reconnection.

use std::time::Duration;

/// Reconnect schedule: `min(initial * multiplier^n, max)` where `n` is the
/// number of consecutive failed connect attempts, capped at `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: u32,
    /// Ceiling on any single delay.
    pub max: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2,
            max: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Returns the delay to wait after `consecutive_failures` failed
    /// attempts (zero failures means the stream just closed cleanly).
    #[must_use]
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(consecutive_failures)
            .unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Returns true once the failure budget is spent.
    #[must_use]
    pub fn exhausted(&self, consecutive_failures: u32) -> bool {
        consecutive_failures >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_from_initial() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(4), Duration::from_secs(16));
    }

    #[test]
    fn test_delay_is_capped_at_max() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(5), Duration::from_secs(30));
        assert_eq!(policy.delay(9), Duration::from_secs(30));
        assert_eq!(policy.delay(63), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_never_exceeds_max_even_on_overflow() {
        let policy = ReconnectPolicy::default();
        // 2^40 overflows u32; the delay must still be the cap.
        assert_eq!(policy.delay(40), Duration::from_secs(30));
    }

    #[test]
    fn test_exhaustion_boundary() {
        let policy = ReconnectPolicy::default();
        assert!(!policy.exhausted(9));
        assert!(policy.exhausted(10));
        assert!(policy.exhausted(11));
    }

    #[test]
    fn test_custom_policy() {
        let policy = ReconnectPolicy {
            initial: Duration::from_millis(250),
            multiplier: 3,
            max: Duration::from_secs(5),
            max_attempts: 4,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(1), Duration::from_millis(750));
        assert_eq!(policy.delay(2), Duration::from_millis(2250));
        assert_eq!(policy.delay(3), Duration::from_secs(5));
        assert!(policy.exhausted(4));
    }
}
