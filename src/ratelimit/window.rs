//! Window definitions and per-window access logs.

use std::time::Duration;
use tokio::time::Instant;

/// Window name used when a caller enforces only a single window.
pub const DEFAULT_WINDOW: &str = "default";

/// A named enforcement window: at most `limit` grants within the trailing
/// `window` duration ending now.
///
/// Windows sharing a name share one access log per identifier; windows with
/// different names are tracked independently, not nested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowLimit {
    /// Name of the window, e.g. `per_minute`
    pub name: &'static str,
    /// Maximum number of grants within the window. Must be at least 1.
    pub limit: u32,
    /// Duration of the trailing window. Must be at least one second.
    pub window: Duration,
}

impl WindowLimit {
    /// Create a named window limit.
    pub fn new(name: &'static str, limit: u32, window: Duration) -> Self {
        Self {
            name,
            limit,
            window,
        }
    }

    /// Create a window with the default name, for callers that enforce only
    /// one window per identifier.
    pub fn anonymous(limit: u32, window: Duration) -> Self {
        Self::new(DEFAULT_WINDOW, limit, window)
    }
}

/// Timestamps of granted requests for one (identifier, window) pair.
///
/// Only granted requests are recorded; denials never touch the log. Entries
/// are appended in arrival order and purged lazily before each check, so the
/// oldest surviving grant is always the front of the list.
#[derive(Debug, Default)]
pub struct AccessLog {
    grants: Vec<Instant>,
}

impl AccessLog {
    /// Drop every grant at or before `cutoff`.
    pub fn purge(&mut self, cutoff: Instant) {
        self.grants.retain(|&t| t > cutoff);
    }

    /// Number of grants currently in the log.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether the log holds no grants.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// The oldest surviving grant, if any.
    pub fn oldest(&self) -> Option<Instant> {
        self.grants.first().copied()
    }

    /// Record a granted request at `now`.
    pub fn record(&mut self, now: Instant) {
        self.grants.push(now);
    }
}
