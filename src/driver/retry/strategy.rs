use rand::random;
use std::time::Duration;

/// Logic used to determine how long to wait between retry attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub enum Strategy {
    /// The driver will wait for the same amount of time between each retry.
    Every(Duration),
    /// Exponential backoff waiting strategy, where the duration between
    /// attempts (approximately) doubles each time.
    Backoff(ExponentialBackoff),
}

impl Strategy {
    pub(crate) fn retry_in(&self, last_wait: Option<Duration>) -> Duration {
        match self {
            Self::Every(t) => *t,
            Self::Backoff(exp) => exp.retry_in(last_wait),
        }
    }
}

/// Exponential backoff waiting strategy.
///
/// Each attempt waits for `factor` times the last delay plus/minus a random
/// jitter, clamped to a min and max value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialBackoff {
    /// Minimum amount of time to wait between retries.
    ///
    /// *Defaults to 0.25s.*
    pub min: Duration,
    /// Maximum amount of time to wait between retries.
    ///
    /// This will be clamped to `>=` min.
    ///
    /// *Defaults to 10s.*
    pub max: Duration,
    /// Multiplier applied to the previous wait to get the next one.
    ///
    /// *Defaults to `2.0`.*
    pub factor: f32,
    /// Amount of uniform random jitter to apply to generated wait times.
    /// I.e., 0.1 will add +/-10% to generated intervals.
    ///
    /// This is restricted to within +/-100%.
    ///
    /// *Defaults to `0.1`.*
    pub jitter: f32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self { min: Duration::from_millis(250), max: Duration::from_secs(10), factor: 2.0, jitter: 0.1 }
    }
}

impl ExponentialBackoff {
    pub(crate) fn retry_in(&self, last_wait: Option<Duration>) -> Duration {
        let attempt = last_wait.map_or(self.min, |t| t.mul_f32(self.factor.max(0.0)));
        let perturb = (1.0 - (self.jitter * 2.0 * (random::<f32>() - 1.0))).clamp(0.0, 2.0);
        let mut target_time = attempt.mul_f32(perturb);

        let safe_max = if self.max < self.min { self.min } else { self.max };

        target_time = target_time.clamp(self.min, safe_max);

        target_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_max_even_after_many_doublings() {
        let backoff = ExponentialBackoff {
            min: Duration::from_millis(100),
            max: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.1,
        };
        let mut last = None;
        for _ in 0..32 {
            let wait = backoff.retry_in(last);
            assert!(wait <= Duration::from_secs(1) + Duration::from_millis(1));
            assert!(wait >= backoff.min.mul_f32(0.9) - Duration::from_millis(1));
            last = Some(wait);
        }
    }

    #[test]
    fn backoff_with_inverted_bounds_clamps_to_min() {
        let backoff = ExponentialBackoff {
            min: Duration::from_secs(5),
            max: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.0,
        };
        assert_eq!(backoff.retry_in(None), Duration::from_secs(5));
    }

    #[test]
    fn factor_controls_the_growth_rate_between_attempts() {
        let backoff = ExponentialBackoff {
            min: Duration::from_millis(100),
            max: Duration::from_secs(60),
            factor: 3.0,
            jitter: 0.0,
        };
        let first = backoff.retry_in(None);
        let second = backoff.retry_in(Some(first));
        assert_eq!(first, Duration::from_millis(100));
        assert_eq!(second, Duration::from_millis(300));
    }

    #[test]
    fn every_strategy_ignores_last_wait() {
        let strategy = Strategy::Every(Duration::from_millis(500));
        assert_eq!(strategy.retry_in(None), Duration::from_millis(500));
        assert_eq!(strategy.retry_in(Some(Duration::from_secs(3))), Duration::from_millis(500));
    }
}
