//! Worker pool errors.

use thiserror::Error;

/// Errors raised by the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has no workers or was shut down.
    #[error("worker pool not available")]
    Unavailable,

    /// No worker became free within the caller's timeout.
    #[error("all workers busy")]
    AllWorkersBusy,

    /// The serialized request exceeds the IPC size cap.
    #[error("request too large: {size} bytes")]
    RequestTooLarge {
        /// Serialized request size.
        size: usize,
    },

    /// A worker subprocess could not be spawned.
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// Writing the request to the worker failed.
    #[error("worker stdin write failed: {0}")]
    WriteFailed(String),

    /// Reading the response from the worker failed.
    #[error("worker read error: {0}")]
    ReadFailed(String),

    /// The worker did not respond within the caller's timeout.
    #[error("worker timeout")]
    Timeout,

    /// The worker produced no response line.
    #[error("empty worker response")]
    EmptyResponse,

    /// The response line was not valid JSON.
    #[error("malformed worker response: {0}")]
    MalformedResponse(String),

    /// The response id does not match the request (desynchronized worker).
    #[error("response id mismatch")]
    IdMismatch,

    /// The worker reported an action-level error.
    #[error("worker error: {0}")]
    WorkerError(String),
}

/// Result alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
