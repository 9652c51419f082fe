//! Configuration errors.

use thiserror::Error;

/// Errors raised while building [`crate::GatewayConfig`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The audit encryption key is present but malformed.
    #[error("invalid audit encryption key: {detail}")]
    InvalidAuditKey {
        /// What was wrong with the value.
        detail: String,
    },

    /// A numeric environment variable failed to parse.
    #[error("invalid value for {var}: {value:?}")]
    InvalidNumber {
        /// The environment variable name.
        var: String,
        /// The raw value that failed to parse.
        value: String,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
