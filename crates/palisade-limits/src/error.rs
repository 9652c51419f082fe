//! Rate limit denials.

use thiserror::Error;

/// A denied request, carrying enough data for the caller to recover.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The per-client sliding window is full.
    #[error("rate limit exceeded, retry in {retry_after_seconds}s")]
    ClientLimitExceeded {
        /// Seconds until the oldest tracked request leaves the window.
        retry_after_seconds: u64,
    },

    /// The per-user quota is exhausted.
    #[error("user rate limit exceeded for {user}, retry in {retry_after_seconds}s")]
    UserLimitExceeded {
        /// The username whose quota ran out.
        user: String,
        /// Seconds until the quota resets.
        retry_after_seconds: u64,
    },
}

impl RateLimitError {
    /// The retry hint, regardless of which limiter fired.
    #[must_use]
    pub fn retry_after_seconds(&self) -> u64 {
        match self {
            Self::ClientLimitExceeded {
                retry_after_seconds,
            }
            | Self::UserLimitExceeded {
                retry_after_seconds,
                ..
            } => *retry_after_seconds,
        }
    }
}

/// Result alias for rate limit checks.
pub type RateLimitResult<T> = Result<T, RateLimitError>;
