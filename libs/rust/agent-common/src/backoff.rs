//! Exponential backoff with a cap and jitter.
//!
//! The policy only computes delays. Callers own the loop, so a caller can
//! reset the attempt counter at the start of each cycle and keep retrying
//! forever while still bounding the burst of attempts per cycle.

use std::time::Duration;

/// Share of the computed delay that jitter may remove.
const JITTER_RATIO: f64 = 0.25;

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum attempts before a cycle counts as exhausted
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Set the per-cycle attempt limit.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Backoff policy computing retry delays.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    config: BackoffConfig,
}

impl BackoffPolicy {
    /// Create a new policy with the given configuration.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Create a policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BackoffConfig::default())
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// The un-jittered delay is `initial * multiplier^attempt` capped at
    /// `max_delay`. Jitter only shortens it, so the cap always holds.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_ms =
            self.config.initial_delay.as_millis() as f64 * self.config.multiplier.powi(exponent);
        let capped_ms = base_ms.min(self.config.max_delay.as_millis() as f64);

        let delay_ms = if self.config.jitter {
            capped_ms * (1.0 - rand::random::<f64>() * JITTER_RATIO)
        } else {
            capped_ms
        };

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Whether `attempts` failed attempts use up the current cycle.
    #[must_use]
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.config.max_retries
    }

    /// The delay cap, also used as the pause between exhausted cycles.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.config.max_delay
    }

    /// Get the per-cycle attempt limit.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_config() {
        let config = BackoffConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(300));
    }

    #[test]
    fn test_delay_doubles_without_jitter() {
        let policy = BackoffPolicy::new(
            BackoffConfig::default()
                .with_initial_delay(Duration::from_millis(100))
                .without_jitter(),
        );

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = BackoffPolicy::new(
            BackoffConfig::default()
                .with_initial_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_millis(150))
                .without_jitter(),
        );

        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(150));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(150));
    }

    #[test]
    fn test_exhaustion() {
        let policy = BackoffPolicy::new(BackoffConfig::default().with_max_retries(3));

        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    proptest! {
        #[test]
        fn prop_jittered_delay_within_bounds(attempt in 0u32..64, cap_ms in 1u64..600_000) {
            let policy = BackoffPolicy::new(
                BackoffConfig::default()
                    .with_initial_delay(Duration::from_millis(250))
                    .with_max_delay(Duration::from_millis(cap_ms)),
            );
            let unjittered = (250.0 * 2f64.powi(attempt as i32)).min(cap_ms as f64);

            let delay = policy.delay_for_attempt(attempt).as_secs_f64() * 1000.0;

            prop_assert!(delay <= cap_ms as f64 + 1e-3);
            prop_assert!(delay >= unjittered * (1.0 - JITTER_RATIO) - 1.0);
        }
    }
}
