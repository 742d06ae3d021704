/// Failed-login throttling keyed by identity + requester IP.
///
/// The attempt cache is a volatile accelerator, never the record of any
/// security state: when it errors the limiter fails open (zero attempts)
/// with a degraded-mode warning, and the login flow continues to the
/// credential check.
use dashmap::DashMap;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::time::sleep;

pub const MAX_FAILED_ATTEMPTS: u32 = 5;
pub const ATTEMPT_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, thiserror::Error)]
#[error("attempt cache unavailable: {0}")]
pub struct CacheError(pub String);

/// Volatile counter store for failed login attempts. Every operation can
/// fail; callers decide the degradation policy.
pub trait AttemptCache: Send + Sync {
    fn get(&self, key: &str) -> Result<u32, CacheError>;
    fn record_failure(&self, key: &str, window: Duration) -> Result<u32, CacheError>;
    fn clear(&self, key: &str) -> Result<(), CacheError>;
}

struct AttemptEntry {
    count: u32,
    expires_at: Instant,
}

/// In-process implementation backed by DashMap with a spawned sweeper.
pub struct MemoryAttemptCache {
    entries: Arc<DashMap<String, AttemptEntry>>,
}

impl MemoryAttemptCache {
    pub fn new() -> Self {
        let cache = Self {
            entries: Arc::new(DashMap::new()),
        };

        let entries = cache.entries.clone();
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(300)).await;
                let now = Instant::now();
                entries.retain(|_, entry| now < entry.expires_at);
                tracing::debug!("Attempt cache sweep done, live entries: {}", entries.len());
            }
        });

        cache
    }

    /// Constructor without the sweeper, for contexts with no tokio runtime.
    #[cfg(test)]
    fn unswept() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl AttemptCache for MemoryAttemptCache {
    fn get(&self, key: &str) -> Result<u32, CacheError> {
        match self.entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Ok(entry.count),
            _ => Ok(0),
        }
    }

    fn record_failure(&self, key: &str, window: Duration) -> Result<u32, CacheError> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| AttemptEntry {
                count: 0,
                expires_at: now + window,
            });

        if now >= entry.expires_at {
            entry.count = 0;
            entry.expires_at = now + window;
        }
        entry.count += 1;
        Ok(entry.count)
    }

    fn clear(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct LoginLimiter {
    cache: Arc<dyn AttemptCache>,
}

impl LoginLimiter {
    pub fn new(cache: Arc<dyn AttemptCache>) -> Self {
        Self { cache }
    }

    pub fn attempt_key(email: &str, ip: &str) -> String {
        format!("login:{}:{}", email.trim().to_lowercase(), ip)
    }

    /// True when this identity+IP has reached the failure threshold.
    /// Callers must check this before any user lookup or bcrypt work.
    pub fn is_limited(&self, key: &str) -> bool {
        match self.cache.get(key) {
            Ok(count) => count >= MAX_FAILED_ATTEMPTS,
            Err(err) => {
                tracing::warn!("Login limiter degraded, failing open: {}", err);
                false
            }
        }
    }

    pub fn record_failure(&self, key: &str) {
        match self.cache.record_failure(key, ATTEMPT_WINDOW) {
            Ok(count) => {
                tracing::debug!("Recorded failed login attempt {} for {}", count, key);
            }
            Err(err) => {
                tracing::warn!("Login limiter degraded, failure not recorded: {}", err);
            }
        }
    }

    pub fn clear(&self, key: &str) {
        if let Err(err) = self.cache.clear(key) {
            tracing::warn!("Login limiter degraded, counter not cleared: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenCache;

    impl AttemptCache for BrokenCache {
        fn get(&self, _key: &str) -> Result<u32, CacheError> {
            Err(CacheError("connection refused".to_string()))
        }

        fn record_failure(&self, _key: &str, _window: Duration) -> Result<u32, CacheError> {
            Err(CacheError("connection refused".to_string()))
        }

        fn clear(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError("connection refused".to_string()))
        }
    }

    #[test]
    fn limits_after_threshold() {
        let limiter = LoginLimiter::new(Arc::new(MemoryAttemptCache::unswept()));
        let key = LoginLimiter::attempt_key("A@B.com", "10.0.0.1");

        for _ in 0..MAX_FAILED_ATTEMPTS - 1 {
            limiter.record_failure(&key);
            assert!(!limiter.is_limited(&key));
        }

        limiter.record_failure(&key);
        assert!(limiter.is_limited(&key));
    }

    #[test]
    fn key_is_case_insensitive_on_email() {
        assert_eq!(
            LoginLimiter::attempt_key("User@Example.com", "1.2.3.4"),
            LoginLimiter::attempt_key("user@example.com", "1.2.3.4"),
        );
    }

    #[test]
    fn distinct_ips_tracked_separately() {
        let limiter = LoginLimiter::new(Arc::new(MemoryAttemptCache::unswept()));
        let key_a = LoginLimiter::attempt_key("a@b.com", "1.1.1.1");
        let key_b = LoginLimiter::attempt_key("a@b.com", "2.2.2.2");

        for _ in 0..MAX_FAILED_ATTEMPTS {
            limiter.record_failure(&key_a);
        }

        assert!(limiter.is_limited(&key_a));
        assert!(!limiter.is_limited(&key_b));
    }

    #[test]
    fn clear_resets_counter() {
        let limiter = LoginLimiter::new(Arc::new(MemoryAttemptCache::unswept()));
        let key = LoginLimiter::attempt_key("a@b.com", "1.1.1.1");

        for _ in 0..MAX_FAILED_ATTEMPTS {
            limiter.record_failure(&key);
        }
        assert!(limiter.is_limited(&key));

        limiter.clear(&key);
        assert!(!limiter.is_limited(&key));
    }

    #[test]
    fn fails_open_when_cache_is_down() {
        let limiter = LoginLimiter::new(Arc::new(BrokenCache));
        let key = LoginLimiter::attempt_key("a@b.com", "1.1.1.1");

        // Nothing throws and nobody is locked out.
        limiter.record_failure(&key);
        assert!(!limiter.is_limited(&key));
        limiter.clear(&key);
    }
}
