//! Per-domain token-bucket rate limiting. One bucket per domain, created
//! lazily, refilled on access. Buckets live in a sharded concurrent map so
//! callers targeting different domains never contend.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Token bucket with lazy refill: tokens accrue at `refill_rate` per second
/// up to `capacity`, computed on each access instead of by a timer.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            tokens: f64::from(capacity),
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    pub fn try_consume(&mut self, tokens: f64) -> bool {
        self.try_consume_at(tokens, Instant::now())
    }

    pub(crate) fn try_consume_at(&mut self, tokens: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= tokens {
            self.tokens -= tokens;
            true
        } else {
            false
        }
    }

    /// Time until `tokens` would be available, assuming no consumption in
    /// the meantime.
    pub fn wait_time(&mut self, tokens: f64) -> Duration {
        self.wait_time_at(tokens, Instant::now())
    }

    pub(crate) fn wait_time_at(&mut self, tokens: f64, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= tokens {
            return Duration::ZERO;
        }
        let needed = tokens - self.tokens;
        Duration::from_secs_f64(needed / self.refill_rate)
    }

    pub(crate) fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }
}

/// Gates every outbound request, one bucket per domain.
pub struct DomainRateLimiter {
    default_rate: f64,
    burst_capacity: u32,
    buckets: DashMap<String, TokenBucket>,
}

impl DomainRateLimiter {
    pub fn new(requests_per_second: f64, burst_capacity: u32) -> Self {
        Self {
            default_rate: requests_per_second,
            burst_capacity,
            buckets: DashMap::new(),
        }
    }

    /// Refill the domain's bucket for elapsed time, then consume if enough
    /// tokens exist.
    pub fn try_consume(&self, domain: &str, tokens: f64) -> bool {
        self.bucket_entry(domain).try_consume(tokens)
    }

    pub fn wait_time(&self, domain: &str, tokens: f64) -> Duration {
        self.bucket_entry(domain).wait_time(tokens)
    }

    /// Block until a request to `domain` is permitted. A `custom_delay`
    /// (typically a robots.txt crawl-delay) bypasses the bucket entirely.
    /// Bucket waits sleep at most one second per iteration so shutdown
    /// signals stay responsive.
    pub async fn wait_if_needed(&self, domain: &str, custom_delay: Option<Duration>) {
        if let Some(delay) = custom_delay {
            tokio::time::sleep(delay).await;
            return;
        }

        loop {
            if self.try_consume(domain, 1.0) {
                return;
            }
            let wait = self.wait_time(domain, 1.0);
            tracing::debug!(domain, wait_secs = wait.as_secs_f64(), "rate limiting");
            tokio::time::sleep(wait.min(Duration::from_secs(1))).await;
        }
    }

    /// Operator override: replace the domain's bucket with a fresh one at
    /// the given rate and the configured burst capacity.
    pub fn set_domain_rate(&self, domain: &str, requests_per_second: f64) {
        self.buckets.insert(
            domain.to_string(),
            TokenBucket::new(self.burst_capacity, requests_per_second),
        );
    }

    fn bucket_entry(
        &self,
        domain: &str,
    ) -> dashmap::mapref::one::RefMut<'_, String, TokenBucket> {
        self.buckets
            .entry(domain.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst_capacity, self.default_rate))
    }
}
