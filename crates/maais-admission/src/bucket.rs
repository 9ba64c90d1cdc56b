//! A continuously refilling token bucket.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::BucketConfig;

/// Point-in-time view of a bucket, for inspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketState {
    pub capacity: u32,
    pub refill_per_sec: f64,
    /// Fractional tokens currently held.
    pub tokens: f64,
}

/// Tokens accrue at `refill_per_sec`, capped at `capacity`. Not
/// synchronized: the controller holds every bucket behind one lock.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    config: BucketConfig,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(config: BucketConfig, now: Instant) -> Self {
        Self {
            config,
            tokens: f64::from(config.capacity),
            last_refill: now,
        }
    }

    /// `tokens = min(capacity, tokens + elapsed * refill_per_sec)`.
    ///
    /// A `now` earlier than the last refill is ignored.
    pub fn refill(&mut self, now: Instant) {
        let Some(elapsed) = now.checked_duration_since(self.last_refill) else {
            return;
        };
        let capacity = f64::from(self.config.capacity);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.config.refill_per_sec).min(capacity);
        self.last_refill = now;
    }

    pub fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    /// Remove one token. Callers check `has_token` first.
    pub fn take(&mut self) {
        self.tokens -= 1.0;
    }

    pub fn is_full(&self) -> bool {
        self.tokens >= f64::from(self.config.capacity)
    }

    /// Time until one whole token is available. `None` if it never will be,
    /// or if the wait does not fit in a `Duration`.
    pub fn retry_after(&self) -> Option<Duration> {
        if self.has_token() {
            return Some(Duration::ZERO);
        }
        if self.config.refill_per_sec <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64((1.0 - self.tokens) / self.config.refill_per_sec).ok()
    }

    /// Apply new limits, keeping the tokens already held up to the new
    /// capacity.
    pub fn reconfigure(&mut self, config: BucketConfig) {
        self.config = config;
        self.tokens = self.tokens.min(f64::from(config.capacity));
    }

    pub fn state(&self) -> BucketState {
        BucketState {
            capacity: self.config.capacity,
            refill_per_sec: self.config.refill_per_sec,
            tokens: self.tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::TokenBucket;
    use crate::config::BucketConfig;

    #[test]
    fn refill_is_proportional_and_capped() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(BucketConfig::new(10, 4.0), t0);
        for _ in 0..10 {
            bucket.take();
        }
        assert!(!bucket.has_token());

        bucket.refill(t0 + Duration::from_millis(500));
        assert!((bucket.state().tokens - 2.0).abs() < 1e-9);

        bucket.refill(t0 + Duration::from_secs(60));
        assert_eq!(bucket.state().tokens, 10.0);
        assert!(bucket.is_full());
    }

    #[test]
    fn retry_after_reflects_deficit() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(BucketConfig::new(1, 10.0), t0);
        bucket.take();
        let wait = bucket.retry_after().unwrap();
        assert!(wait > Duration::from_millis(99) && wait <= Duration::from_millis(100));
    }

    #[test]
    fn non_refilling_bucket_never_recovers() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(BucketConfig::new(1, 0.0), t0);
        bucket.take();
        bucket.refill(t0 + Duration::from_secs(3600));
        assert!(!bucket.has_token());
        assert_eq!(bucket.retry_after(), None);
    }

    #[test]
    fn unrepresentable_wait_has_no_hint() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(BucketConfig::new(1, 1e-30), t0);
        bucket.take();
        assert_eq!(bucket.retry_after(), None);
    }

    #[test]
    fn clock_going_backwards_is_ignored() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(1);
        let mut bucket = TokenBucket::new(BucketConfig::new(5, 1.0), later);
        bucket.take();
        bucket.refill(t0);
        assert_eq!(bucket.state().tokens, 4.0);
    }

    #[test]
    fn reconfigure_clamps_tokens() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(BucketConfig::new(50, 1.0), t0);
        bucket.reconfigure(BucketConfig::new(5, 1.0));
        assert_eq!(bucket.state().tokens, 5.0);
        assert_eq!(bucket.state().capacity, 5);
    }
}
