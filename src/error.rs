//! Error types for the rategate service.

use thiserror::Error;

/// Main error type for rategate operations.
#[derive(Error, Debug)]
pub enum RategateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for rategate operations.
pub type Result<T> = std::result::Result<T, RategateError>;

/// Denial verdict from the rate limiter.
///
/// Carries the name of the first violated window and the number of seconds
/// after which the denial is expected to lift. Denials are an expected,
/// high-frequency outcome rather than a system failure, so this type is
/// kept separate from [`RategateError`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{window} limit exceeded, retry in {retry_after_secs}s")]
pub struct RateLimitExceeded {
    /// Name of the violated window (e.g. `per_minute`)
    pub window: &'static str,
    /// Seconds the caller should wait before retrying. Always at least 1.
    pub retry_after_secs: u64,
}
