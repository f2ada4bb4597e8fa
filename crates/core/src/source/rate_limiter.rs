//! Token bucket rate limiter, one bucket per source.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

/// Token bucket rate limiter for a single source.
///
/// Tokens are added at a constant rate and consumed per request. If no token
/// is available the caller must wait.
#[derive(Debug)]
pub struct TokenBucket {
    /// Max tokens (= requests per minute).
    capacity: f32,
    /// Current available tokens.
    tokens: f32,
    /// Tokens added per second.
    refill_rate: f32,
    /// Last refill time.
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a new token bucket with the given rate limit.
    ///
    /// The bucket starts full, allowing immediate requests up to the capacity.
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1) as f32;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Try to acquire a token.
    ///
    /// Returns `Err(wait_duration)` if rate limited.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            let wait_secs = tokens_needed / self.refill_rate;
            Err(Duration::from_secs_f32(wait_secs))
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Pool of rate limiters keyed by source id.
///
/// Sources without a configured limit are never throttled.
#[derive(Debug, Default)]
pub struct RateLimiterPool {
    limiters: RwLock<HashMap<String, TokenBucket>>,
}

impl RateLimiterPool {
    /// Create a pool from `(source_id, requests_per_minute)` pairs.
    pub fn new<'a>(limits: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        let limiters = limits
            .into_iter()
            .map(|(id, rpm)| (id.to_string(), TokenBucket::new(rpm)))
            .collect();
        Self {
            limiters: RwLock::new(limiters),
        }
    }

    /// Create an empty pool.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wait until a token is available for `source_id`.
    ///
    /// Callers bound this with their own timeout.
    pub async fn acquire(&self, source_id: &str) {
        loop {
            let wait = {
                let mut limiters = self.limiters.write().await;
                match limiters.get_mut(source_id) {
                    Some(bucket) => match bucket.try_acquire() {
                        Ok(()) => return,
                        Err(wait) => wait,
                    },
                    None => return,
                }
            };
            tracing::debug!(source = source_id, wait_ms = wait.as_millis() as u64, "Rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[test]
    fn test_token_bucket_new() {
        let bucket = TokenBucket::new(10);
        assert_eq!(bucket.capacity, 10.0);
        assert_eq!(bucket.tokens, 10.0);
        assert!((bucket.refill_rate - 10.0 / 60.0).abs() < 0.001);
    }

    #[test]
    fn test_token_bucket_zero_rpm_clamped() {
        let bucket = TokenBucket::new(0);
        assert_eq!(bucket.capacity, 1.0);
    }

    #[test]
    fn test_token_bucket_acquire_until_empty() {
        let mut bucket = TokenBucket::new(10);
        for _ in 0..10 {
            assert!(bucket.try_acquire().is_ok());
        }
        let wait = bucket.try_acquire().unwrap_err();
        // At 10 rpm, 1 token takes 6 seconds to refill
        assert!(wait.as_secs() <= 6);
        assert!(wait.as_millis() > 0);
    }

    #[tokio::test]
    async fn test_token_bucket_refill() {
        let mut bucket = TokenBucket::new(60); // 1 token per second
        for _ in 0..60 {
            bucket.try_acquire().unwrap();
        }
        sleep(Duration::from_millis(100)).await;
        bucket.refill();
        assert!(bucket.tokens > 0.05);
        assert!(bucket.tokens < 0.3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_throttles_only_limited_sources() {
        let pool = RateLimiterPool::new([("wikidata", 2)]);
        pool.acquire("wikidata").await;
        pool.acquire("wikidata").await;
        let third =
            tokio::time::timeout(Duration::from_millis(100), pool.acquire("wikidata")).await;
        assert!(third.is_err());

        for _ in 0..100 {
            pool.acquire("anything").await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_acquire_waits_for_refill() {
        let pool = RateLimiterPool::new([("slow", 60)]);
        for _ in 0..60 {
            pool.acquire("slow").await;
        }
        let started = Instant::now();
        pool.acquire("slow").await;
        assert!(started.elapsed() >= Duration::from_millis(900));
    }
}
