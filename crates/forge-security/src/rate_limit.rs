use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter per session. `max_tokens`/`refill_rate` are
/// stored as atomics (bit-cast f64) rather than plain fields so
/// [`Self::reconfigure`] can apply a config-reload without restarting the
/// gateway or taking a lock on the per-session bucket map.
pub struct RateLimiter {
    max_tokens: AtomicU64,
    refill_rate: AtomicU64, // tokens per second
    buckets: Mutex<HashMap<Uuid, Bucket>>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    /// - `max_tokens`: maximum burst size
    /// - `refill_rate`: tokens added per second
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            max_tokens: AtomicU64::new(max_tokens.to_bits()),
            refill_rate: AtomicU64::new(refill_rate.to_bits()),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn max_tokens(&self) -> f64 {
        f64::from_bits(self.max_tokens.load(Ordering::Relaxed))
    }

    fn refill_rate(&self) -> f64 {
        f64::from_bits(self.refill_rate.load(Ordering::Relaxed))
    }

    /// Applies new burst/refill settings, e.g. from a hot-reloaded config
    /// file. Existing buckets keep their current token count and are
    /// simply clamped to the new `max_tokens` on their next refill.
    pub fn reconfigure(&self, max_tokens: f64, refill_rate: f64) {
        self.max_tokens.store(max_tokens.to_bits(), Ordering::Relaxed);
        self.refill_rate.store(refill_rate.to_bits(), Ordering::Relaxed);
    }

    /// Try to consume one token for the given session.
    /// Returns `true` if allowed, `false` if rate limited.
    pub async fn check(&self, session_id: Uuid) -> bool {
        let max_tokens = self.max_tokens();
        let refill_rate = self.refill_rate();
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();

        let bucket = buckets.entry(session_id).or_insert(Bucket {
            tokens: max_tokens,
            last_refill: now,
        });

        // Refill tokens based on elapsed time
        let elapsed = now.duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * refill_rate).min(max_tokens);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Remove expired buckets (no activity for the given duration).
    pub async fn cleanup(&self, max_idle: Duration) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.retain(|_, b| now.duration_since(b.last_refill) < max_idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_allows() {
        let limiter = RateLimiter::new(5.0, 1.0);
        let session = Uuid::new_v4();
        // Should allow first 5 requests
        for _ in 0..5 {
            assert!(limiter.check(session).await);
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks() {
        let limiter = RateLimiter::new(2.0, 0.1);
        let session = Uuid::new_v4();
        assert!(limiter.check(session).await);
        assert!(limiter.check(session).await);
        // Third should be blocked (not enough tokens refilled)
        assert!(!limiter.check(session).await);
    }

    #[tokio::test]
    async fn test_reconfigure_raises_burst_for_new_sessions() {
        let limiter = RateLimiter::new(1.0, 0.0);
        let session = Uuid::new_v4();
        assert!(limiter.check(session).await);
        assert!(!limiter.check(session).await);

        limiter.reconfigure(5.0, 0.0);
        let fresh_session = Uuid::new_v4();
        for _ in 0..5 {
            assert!(limiter.check(fresh_session).await);
        }
        assert!(!limiter.check(fresh_session).await);
    }
}
