//! Core rate limiter implementation.

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::RateLimitExceeded;

use super::window::{AccessLog, WindowLimit};

/// The core sliding-window rate limiter.
///
/// State is a map from identifier to that identifier's per-window access
/// logs. Each identifier's logs are mutated under the exclusive guard of its
/// map entry, so the purge-count-append sequence is atomic per identifier
/// while checks for unrelated identifiers proceed in parallel on other
/// shards.
///
/// The limiter performs no I/O and never suspends; construct it once at
/// process start and share it across request tasks via `Arc`.
pub struct RateLimiter {
    /// Access logs indexed by identifier, then by window name
    state: DashMap<String, HashMap<&'static str, AccessLog>>,
}

impl RateLimiter {
    /// Create a new rate limiter with no recorded state.
    pub fn new() -> Self {
        Self {
            state: DashMap::new(),
        }
    }

    /// Check a single window for `identifier`.
    ///
    /// A grant records the current time in the window's access log; a denial
    /// leaves the log untouched and reports how long the caller should wait.
    pub fn check(&self, identifier: &str, window: &WindowLimit) -> Result<(), RateLimitExceeded> {
        self.check_all(identifier, std::slice::from_ref(window))
    }

    /// Check several windows for `identifier`, in the order given.
    ///
    /// Each window is tracked against its own access log keyed by the window
    /// name. Every window is evaluated before any log is written, so a denial
    /// never registers a partial grant; the first violated window in slice
    /// order short-circuits and is reported. On success the grant is recorded
    /// in every window's log.
    pub fn check_all(
        &self,
        identifier: &str,
        windows: &[WindowLimit],
    ) -> Result<(), RateLimitExceeded> {
        debug_assert!(
            windows
                .iter()
                .all(|w| w.limit >= 1 && w.window >= Duration::from_secs(1)),
            "window limits must be validated at policy load time"
        );

        let now = Instant::now();
        let mut entry = self.state.entry(identifier.to_string()).or_default();
        let logs = entry.value_mut();

        // Read-only pass: purge expired grants, then look for a violation.
        for w in windows {
            let log = logs.entry(w.name).or_default();
            if let Some(cutoff) = now.checked_sub(w.window) {
                log.purge(cutoff);
            }
            if log.len() as u32 >= w.limit {
                let retry_after_secs = retry_after(log.oldest(), w.window, now);
                debug!(
                    identifier,
                    window = w.name,
                    limit = w.limit,
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                return Err(RateLimitExceeded {
                    window: w.name,
                    retry_after_secs,
                });
            }
        }

        // Commit pass: every window passed, record the grant in each log.
        for w in windows {
            logs.entry(w.name).or_default().record(now);
        }

        trace!(identifier, windows = windows.len(), "Request granted");
        Ok(())
    }

    /// Clear one identifier's full state, or all state when no identifier is
    /// given.
    ///
    /// Intended for operator intervention and test isolation; not exposed
    /// over the network.
    pub fn reset(&self, identifier: Option<&str>) {
        match identifier {
            Some(id) => {
                self.state.remove(id);
            }
            None => self.state.clear(),
        }
    }

    /// Current number of recorded grants for one (identifier, window) pair.
    ///
    /// Returns `None` if no log exists. Expired grants are not purged here;
    /// the count reflects the log as of the last check.
    pub fn grant_count(&self, identifier: &str, window: &str) -> Option<usize> {
        self.state
            .get(identifier)
            .and_then(|logs| logs.get(window).map(AccessLog::len))
    }

    /// Number of identifiers with live state.
    pub fn identifier_count(&self) -> usize {
        self.state.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Seconds until the oldest surviving grant leaves the window, floored and
/// then bumped by one so the caller always waits past the expiry boundary.
fn retry_after(oldest: Option<Instant>, window: Duration, now: Instant) -> u64 {
    let Some(oldest) = oldest else {
        return 1;
    };
    let remaining = (oldest + window).saturating_duration_since(now);
    remaining.as_secs().saturating_add(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time;

    use crate::ratelimit::window::DEFAULT_WINDOW;

    fn per_minute(limit: u32) -> WindowLimit {
        WindowLimit::new("per_minute", limit, Duration::from_secs(60))
    }

    fn per_hour(limit: u32) -> WindowLimit {
        WindowLimit::new("per_hour", limit, Duration::from_secs(3600))
    }

    #[tokio::test(start_paused = true)]
    async fn test_grants_up_to_limit_then_denies() {
        let limiter = RateLimiter::new();
        let window = WindowLimit::anonymous(3, Duration::from_secs(10));

        for _ in 0..3 {
            assert!(limiter.check("user:1:chat", &window).is_ok());
        }

        let denied = limiter.check("user:1:chat", &window).unwrap_err();
        assert_eq!(denied.window, DEFAULT_WINDOW);
        assert!(denied.retry_after_secs >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_computed_from_oldest_grant() {
        let limiter = RateLimiter::new();
        let window = WindowLimit::anonymous(3, Duration::from_secs(10));

        // Grants at t=0, t=1, t=2.
        for _ in 0..3 {
            assert!(limiter.check("id", &window).is_ok());
            time::advance(Duration::from_secs(1)).await;
        }

        // At t=3 the oldest grant (t=0) has 7s left in the window.
        let denied = limiter.check("id", &window).unwrap_err();
        assert_eq!(denied.retry_after_secs, 8);

        // At t=11 the t=0 grant has expired and the call is allowed again.
        time::advance(Duration::from_secs(8)).await;
        assert!(limiter.check("id", &window).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denial_is_not_recorded() {
        let limiter = RateLimiter::new();
        let window = WindowLimit::anonymous(2, Duration::from_secs(60));

        assert!(limiter.check("id", &window).is_ok());
        assert!(limiter.check("id", &window).is_ok());
        assert!(limiter.check("id", &window).is_err());
        assert!(limiter.check("id", &window).is_err());

        assert_eq!(limiter.grant_count("id", DEFAULT_WINDOW), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_any_alignment() {
        let limiter = RateLimiter::new();
        let window = WindowLimit::anonymous(2, Duration::from_secs(10));

        assert!(limiter.check("id", &window).is_ok()); // t=0
        time::advance(Duration::from_secs(5)).await;
        assert!(limiter.check("id", &window).is_ok()); // t=5

        // t=9: both grants sit inside the trailing window.
        time::advance(Duration::from_secs(4)).await;
        assert!(limiter.check("id", &window).is_err());

        // t=11: the t=0 grant has expired, the t=5 grant has not.
        time::advance(Duration::from_secs(2)).await;
        assert!(limiter.check("id", &window).is_ok());

        // t=14: grants at t=5 and t=11 still occupy the window.
        time::advance(Duration::from_secs(3)).await;
        assert!(limiter.check("id", &window).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_violated_window_reported() {
        let limiter = RateLimiter::new();
        let windows = [per_minute(1), per_hour(1)];

        assert!(limiter.check_all("id", &windows).is_ok());

        // Both windows are exhausted; the first in slice order is reported.
        let denied = limiter.check_all("id", &windows).unwrap_err();
        assert_eq!(denied.window, "per_minute");

        let reversed = [per_hour(1), per_minute(1)];
        let denied = limiter.check_all("id", &reversed).unwrap_err();
        assert_eq!(denied.window, "per_hour");
    }

    #[tokio::test(start_paused = true)]
    async fn test_finer_window_denies_before_coarser_cap() {
        let limiter = RateLimiter::new();
        let windows = [per_minute(2), per_hour(100)];

        assert!(limiter.check_all("id", &windows).is_ok());
        assert!(limiter.check_all("id", &windows).is_ok());

        let denied = limiter.check_all("id", &windows).unwrap_err();
        assert_eq!(denied.window, "per_minute");
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_track_independent_logs() {
        let limiter = RateLimiter::new();
        let windows = [per_minute(10), per_hour(10)];

        assert!(limiter.check_all("id", &windows).is_ok());
        assert_eq!(limiter.grant_count("id", "per_minute"), Some(1));
        assert_eq!(limiter.grant_count("id", "per_hour"), Some(1));

        // A single-window check touches only its own log.
        assert!(limiter.check("id", &per_minute(10)).is_ok());
        assert_eq!(limiter.grant_count("id", "per_minute"), Some(2));
        assert_eq!(limiter.grant_count("id", "per_hour"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_check_leaves_earlier_windows_unchanged() {
        let limiter = RateLimiter::new();
        let windows = [per_minute(5), per_hour(1)];

        assert!(limiter.check_all("id", &windows).is_ok());

        // per_minute passes but per_hour violates; nothing may be recorded.
        assert!(limiter.check_all("id", &windows).is_err());
        assert_eq!(limiter.grant_count("id", "per_minute"), Some(1));
        assert_eq!(limiter.grant_count("id", "per_hour"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_single_identifier() {
        let limiter = RateLimiter::new();
        let window = WindowLimit::anonymous(1, Duration::from_secs(60));

        assert!(limiter.check("a", &window).is_ok());
        assert!(limiter.check("b", &window).is_ok());

        limiter.reset(Some("a"));

        assert!(limiter.check("a", &window).is_ok());
        assert!(limiter.check("b", &window).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_all_identifiers() {
        let limiter = RateLimiter::new();
        let window = WindowLimit::anonymous(1, Duration::from_secs(60));

        assert!(limiter.check("a", &window).is_ok());
        assert!(limiter.check("b", &window).is_ok());
        assert_eq!(limiter.identifier_count(), 2);

        limiter.reset(None);
        assert_eq!(limiter.identifier_count(), 0);
        assert!(limiter.check("a", &window).is_ok());
        assert!(limiter.check("b", &window).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identifiers_are_independent() {
        let limiter = RateLimiter::new();
        let window = WindowLimit::anonymous(1, Duration::from_secs(60));

        assert!(limiter.check("user:1:chat", &window).is_ok());
        assert!(limiter.check("user:1:chat", &window).is_err());
        assert!(limiter.check("user:2:chat", &window).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_checks_grant_exactly_limit() {
        let limiter = Arc::new(RateLimiter::new());
        let window = WindowLimit::anonymous(10, Duration::from_secs(60));

        let mut handles = Vec::new();
        for _ in 0..25 {
            let limiter = Arc::clone(&limiter);
            let window = window.clone();
            handles.push(tokio::spawn(async move {
                limiter.check("shared", &window).is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 10);
        assert_eq!(limiter.grant_count("shared", DEFAULT_WINDOW), Some(10));
    }
}
