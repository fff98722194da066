/// Retry pacing for broker failures: exponential backoff with a ceiling
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay after the first failure is twice this value; success resets to it
    pub initial: Duration,
    /// Upper bound for the delay
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackoffController {
    config: BackoffConfig,
    delay: Duration,
}

impl BackoffController {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            delay: config.initial,
            config,
        }
    }

    /// Double the delay, saturating at the ceiling.
    pub fn on_failure(&mut self) {
        self.delay = self
            .delay
            .checked_mul(2)
            .unwrap_or(self.config.max)
            .min(self.config.max);
    }

    pub fn on_success(&mut self) {
        self.delay = self.config.initial;
    }

    pub fn current_delay(&self) -> Duration {
        self.delay
    }
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_floor() {
        let backoff = BackoffController::default();
        assert_eq!(backoff.current_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_consecutive_failures_double_up_to_cap() {
        let mut backoff = BackoffController::default();

        for n in 1..=10u32 {
            backoff.on_failure();
            let expected = (2 * 2u64.pow(n)).min(30);
            assert_eq!(
                backoff.current_delay(),
                Duration::from_secs(expected),
                "after {n} failures"
            );
        }
    }

    #[test]
    fn test_success_resets_to_floor() {
        let mut backoff = BackoffController::default();
        backoff.on_failure();
        backoff.on_failure();
        backoff.on_failure();

        backoff.on_success();
        assert_eq!(backoff.current_delay(), Duration::from_secs(2));

        backoff.on_failure();
        assert_eq!(backoff.current_delay(), Duration::from_secs(4));
    }

    #[test]
    fn test_never_exceeds_ceiling_under_many_failures() {
        let mut backoff = BackoffController::default();
        for _ in 0..10_000 {
            backoff.on_failure();
        }
        assert_eq!(backoff.current_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        let mut backoff = BackoffController::new(BackoffConfig {
            initial: Duration::MAX / 2 + Duration::from_secs(1),
            max: Duration::MAX,
        });

        backoff.on_failure();
        assert_eq!(backoff.current_delay(), Duration::MAX);
    }

    #[test]
    fn test_custom_bounds() {
        let mut backoff = BackoffController::new(BackoffConfig {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(250),
        });

        backoff.on_failure();
        assert_eq!(backoff.current_delay(), Duration::from_millis(200));
        backoff.on_failure();
        assert_eq!(backoff.current_delay(), Duration::from_millis(250));
    }
}
