//! Event subsystem errors.

use thiserror::Error;

/// Errors raised by the event subsystem (webhook registry persistence and
/// delivery plumbing). Fan-out itself is infallible by design.
#[derive(Debug, Error)]
pub enum EventError {
    /// Registry file could not be read or written.
    #[error("webhook registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry file is malformed.
    #[error("webhook registry parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The endpoint id is unknown.
    #[error("webhook not found: {id}")]
    NotFound {
        /// The id that failed to resolve.
        id: String,
    },
}

/// Result alias for event subsystem operations.
pub type EventResult<T> = Result<T, EventError>;
