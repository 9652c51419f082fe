//! Approval queue errors.

use thiserror::Error;

/// Errors raised by the approval queue.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// The approval id is unknown (never submitted, or already purged).
    #[error("approval not found: {id}")]
    NotFound {
        /// The id that failed to resolve.
        id: String,
    },
}

/// Result alias for approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
