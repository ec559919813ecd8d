//! Exponential backoff schedule for retryable fetch failures.

use rand::Rng;
use std::time::Duration;

/// Computes `base * 2^attempt` capped at `max`, plus up to one second of
/// uniform jitter so synchronized retries spread out.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl ExponentialBackoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: true,
        }
    }

    /// Standard schedule for HTTP retries: 1s base, capped at five minutes.
    pub const fn standard() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.min(20)));
        let capped = exponential.min(self.max);

        if self.jitter {
            let jitter_ms = rand::thread_rng().gen_range(0..1000);
            capped + Duration::from_millis(jitter_ms)
        } else {
            capped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let backoff = ExponentialBackoff::standard().without_jitter();
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_max_cap() {
        let backoff = ExponentialBackoff::standard().without_jitter();
        assert_eq!(backoff.delay(30), Duration::from_secs(300));
    }

    #[test]
    fn test_jitter_bounds() {
        let backoff = ExponentialBackoff::standard();
        for _ in 0..50 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay < Duration::from_secs(3));
        }
    }
}
