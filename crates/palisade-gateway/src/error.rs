//! Gateway-level errors.

use thiserror::Error;

/// Errors raised outside the supervisor pipeline (whose refusals are
/// [`crate::ProcessOutcome`] values, not errors).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Scheduler persistence failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored structure failed to serialize or parse.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The scheduled task id is unknown.
    #[error("task not found: {id}")]
    TaskNotFound {
        /// The id that failed to resolve.
        id: String,
    },

    /// The summarization adapter failed.
    #[error("completion adapter error: {0}")]
    Adapter(String),

    /// Worker pool failure surfaced through dispatch.
    #[error(transparent)]
    Pool(#[from] palisade_pool::PoolError),

    /// Approval queue failure surfaced through the decision wrappers.
    #[error(transparent)]
    Approval(#[from] palisade_approval::ApprovalError),
}

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
