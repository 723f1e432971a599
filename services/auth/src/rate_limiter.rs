//! In-process rate limiter for credential endpoints
//!
//! Sign-in and reset-request attempts are counted per key (the submitted
//! email). A key that exceeds the attempt budget inside the window is
//! banned for a fixed duration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of attempts allowed inside the window
    pub max_attempts: u32,
    /// Counting window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds once the budget is exceeded
    pub ban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,
            ban_duration_seconds: 900,
        }
    }
}

/// Map size at which [`RateLimiter::is_allowed`] sweeps out entries whose
/// window and ban have both lapsed, so unauthenticated traffic cannot grow
/// the map without bound.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct RateLimiterEntry {
    attempts: u32,
    last_attempt: Instant,
    ban_expires: Option<Instant>,
}

impl RateLimiterEntry {
    fn is_live(&self, now: Instant, window: Duration) -> bool {
        let banned = self.ban_expires.is_some_and(|expires| now < expires);
        banned || now.duration_since(self.last_attempt) < window
    }
}

/// Keyed attempt counter shared across handlers
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an attempt for `key` and report whether it is allowed
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if entries.len() >= SWEEP_THRESHOLD {
            let window = Duration::from_secs(self.config.window_seconds);
            entries.retain(|_, entry| entry.is_live(now, window));
        }

        let entry = entries.entry(key.to_string()).or_insert(RateLimiterEntry {
            attempts: 0,
            last_attempt: now,
            ban_expires: None,
        });

        if let Some(ban_expires) = entry.ban_expires {
            if now >= ban_expires {
                entry.attempts = 0;
                entry.ban_expires = None;
            } else {
                return false;
            }
        }

        if now.duration_since(entry.last_attempt) >= Duration::from_secs(self.config.window_seconds)
        {
            entry.attempts = 0;
        }

        if entry.attempts >= self.config.max_attempts {
            entry.ban_expires = Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            info!(
                "Rate limited key {} for {} seconds",
                key, self.config.ban_duration_seconds
            );
            return false;
        }

        entry.attempts += 1;
        entry.last_attempt = now;

        true
    }

    /// Number of keys currently tracked
    pub async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_up_to_budget_then_bans() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_attempts: 3,
            window_seconds: 300,
            ban_duration_seconds: 900,
        });

        for _ in 0..3 {
            assert!(limiter.is_allowed("trader@example.com").await);
        }
        assert!(!limiter.is_allowed("trader@example.com").await);
        assert!(!limiter.is_allowed("trader@example.com").await);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_attempts: 1,
            window_seconds: 300,
            ban_duration_seconds: 900,
        });

        assert!(limiter.is_allowed("a@example.com").await);
        assert!(!limiter.is_allowed("a@example.com").await);
        assert!(limiter.is_allowed("b@example.com").await);
    }

    #[tokio::test]
    async fn test_lapsed_entries_are_swept() {
        // Zero-second window: every entry is stale by the next call, so the
        // sweep keeps the map at or below the threshold no matter how many
        // distinct keys show up.
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_attempts: 5,
            window_seconds: 0,
            ban_duration_seconds: 0,
        });

        for i in 0..(SWEEP_THRESHOLD + 500) {
            limiter.is_allowed(&format!("key{}@example.com", i)).await;
        }

        assert!(limiter.tracked_keys().await <= SWEEP_THRESHOLD);
    }

    #[test]
    fn test_sweep_retention_rules() {
        let start = Instant::now();
        let now = start + Duration::from_secs(1000);
        let window = Duration::from_secs(300);

        // An active ban keeps the entry even when its window has lapsed.
        let banned = RateLimiterEntry {
            attempts: 5,
            last_attempt: start,
            ban_expires: Some(now + Duration::from_secs(100)),
        };
        assert!(banned.is_live(now, window));

        // Window lapsed, no ban: gone.
        let stale = RateLimiterEntry {
            attempts: 2,
            last_attempt: start,
            ban_expires: None,
        };
        assert!(!stale.is_live(now, window));

        // Still inside the window: kept.
        let recent = RateLimiterEntry {
            attempts: 2,
            last_attempt: start + Duration::from_secs(900),
            ban_expires: None,
        };
        assert!(recent.is_live(now, window));

        // Both the ban and the window lapsed: gone.
        let lapsed = RateLimiterEntry {
            attempts: 5,
            last_attempt: start,
            ban_expires: Some(start + Duration::from_secs(500)),
        };
        assert!(!lapsed.is_live(now, window));
    }
}
