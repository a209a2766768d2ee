//! Fixed-window rate limiting backed by the expiring key-value store.
//!
//! Each logical key gets a counter whose TTL is set by the increment that
//! creates it, so the window starts at the first attempt and ends exactly
//! `window` later regardless of how many attempts follow.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::kv::KvStore;

const KEY_PREFIX: &str = "ratelimit:";

/// A named limit: at most `max_attempts` per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRule {
    pub max_attempts: u32,
    pub window: Duration,
}

/// Device code authorization: 5 attempts per minute per user, so a user code
/// cannot be brute forced from one account.
pub const DEVICE_AUTHORIZE: RateLimitRule = RateLimitRule {
    max_attempts: 5,
    window: Duration::from_secs(60),
};

/// Refresh token exchange: 30 per minute per client address.
pub const REFRESH: RateLimitRule = RateLimitRule {
    max_attempts: 30,
    window: Duration::from_secs(60),
};

/// Result of a rate limit check. Not an error either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the current window closes.
    #[serde(rename = "reset_in_secs", serialize_with = "as_secs")]
    pub reset_in: Duration,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Count an attempt against `key`. Allowed while the count is at most
    /// `max_attempts`. If the counter store is down the attempt is allowed
    /// and the outage is logged.
    pub async fn check(&self, key: &str, max_attempts: u32, window: Duration) -> RateLimitDecision {
        let key = format!("{}{}", KEY_PREFIX, key);

        let count = match self.kv.incr_with_ttl(&key, window).await {
            Ok(count) => count,
            Err(e) => {
                warn!(key = %key, error = %e, "Rate limit store unavailable, allowing request");
                return RateLimitDecision {
                    allowed: true,
                    remaining: max_attempts,
                    reset_in: window,
                };
            }
        };

        let reset_in = match self.kv.ttl(&key).await {
            Ok(Some(ttl)) => ttl,
            Ok(None) => window,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read rate limit window");
                window
            }
        };

        let used = u32::try_from(count).unwrap_or(u32::MAX);
        RateLimitDecision {
            allowed: used <= max_attempts,
            remaining: max_attempts.saturating_sub(used),
            reset_in,
        }
    }

    pub async fn check_rule(&self, key: &str, rule: RateLimitRule) -> RateLimitDecision {
        self.check(key, rule.max_attempts, rule.window).await
    }

    /// Clear the counter for `key`, e.g. after a successful sensitive action.
    pub async fn reset(&self, key: &str) {
        let key = format!("{}{}", KEY_PREFIX, key);
        if let Err(e) = self.kv.del(&key).await {
            warn!(key = %key, error = %e, "Failed to reset rate limit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::tests::DownKvStore;
    use crate::kv::MemoryKvStore;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_max_then_blocks() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        for i in 0..5 {
            let d = limiter.check("login:1.2.3.4", 5, window).await;
            assert!(d.allowed, "attempt {} should be allowed", i + 1);
            assert_eq!(d.remaining, 4 - i);
        }

        let sixth = limiter.check("login:1.2.3.4", 5, window).await;
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert!(sixth.reset_in <= window);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_elapses_and_counter_restarts() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        for _ in 0..6 {
            limiter.check("k", 5, window).await;
        }
        assert!(!limiter.check("k", 5, window).await.allowed);

        tokio::time::advance(window).await;

        let d = limiter.check("k", 5, window).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 4);
        assert_eq!(d.reset_in, window);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        assert!(limiter.check("a", 1, window).await.allowed);
        assert!(!limiter.check("a", 1, window).await.allowed);
        assert!(limiter.check("b", 1, window).await.allowed);
    }

    #[tokio::test]
    async fn test_reset_clears_counter() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        assert!(limiter.check("a", 1, window).await.allowed);
        assert!(!limiter.check("a", 1, window).await.allowed);

        limiter.reset("a").await;
        assert!(limiter.check("a", 1, window).await.allowed);
    }

    #[tokio::test]
    async fn test_store_down_fails_open() {
        let limiter = RateLimiter::new(Arc::new(DownKvStore));
        let d = limiter.check_rule("a", DEVICE_AUTHORIZE).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, DEVICE_AUTHORIZE.max_attempts);
    }
}
