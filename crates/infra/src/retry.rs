//! Bounded exponential backoff.

use std::time::Duration;

/// Retry schedule: `initial`, `2 * initial`, `4 * initial`, ... capped at `cap`,
/// for at most `max_retries` retries after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, initial: Duration, cap: Duration) -> Self {
        Self {
            max_retries,
            initial,
            cap,
        }
    }

    /// Never retry.
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based), or `None` once exhausted.
    pub fn delay_for(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        Some(self.initial.saturating_mul(factor).min(self.cap))
    }

    /// Iterate over every delay of the schedule.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_retries).filter_map(|r| self.delay_for(r))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(10), Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_the_cap() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500));
        let delays: Vec<u64> = policy.delays().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn exhausted_schedule_returns_none() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(1));
        assert!(policy.delay_for(2).is_some());
        assert_eq!(policy.delay_for(3), None);
        assert_eq!(RetryPolicy::none().delay_for(1), None);
    }

    #[test]
    fn huge_retry_counts_do_not_overflow() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(200), Some(Duration::from_secs(60)));
    }
}
