//! Reconnect backoff schedule for the live channel.
//!
//! The policy is a pure function of the attempt number so tests can assert
//! exact schedules. There is deliberately no jitter.

use std::time::Duration;

/// Exponential backoff with a delay ceiling and a retry budget.
///
/// `delay(n)` follows `base * 2^(n-1)` capped at `cap`. Once `n` exceeds
/// `max_attempts` the caller stops retrying and falls back to polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    base: Duration,
    /// Upper bound applied to every computed delay.
    cap: Duration,
    /// Number of retries before the caller gives up.
    max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            cap: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Build a policy, clamping degenerate inputs instead of failing.
    ///
    /// Inputs: `base` first-retry delay; `cap` delay ceiling; `max_attempts`
    /// retry budget.
    ///
    /// Output: Policy with `cap >= base` and `max_attempts >= 1` enforced.
    #[must_use]
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap: cap.max(base),
            max_attempts: max_attempts.max(1),
        }
    }

    /// What: Delay to wait before reconnect attempt `attempt`.
    ///
    /// Inputs:
    /// - `attempt`: 1-based attempt number; `0` is treated as `1`.
    ///
    /// Output:
    /// - `base * 2^(attempt-1)`, never exceeding the configured cap.
    ///
    /// Details:
    /// - The exponent is clamped to 30 so the multiplication cannot
    ///   overflow before the cap applies.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.max(1) - 1;
        let factor = 1u32 << exp.min(30);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Retry budget before the caller must fall back.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `attempt` is past the retry budget.
    #[must_use]
    pub const fn is_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}
