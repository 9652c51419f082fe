//! Audit log errors.

use thiserror::Error;

/// Errors raised by the audit log.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The log file could not be opened, written or read.
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to serialize or parse.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sealing a line failed.
    #[error("audit encryption failed")]
    EncryptFailed,

    /// A sealed line failed authentication or was malformed.
    #[error("audit decryption failed: {detail}")]
    DecryptFailed {
        /// What went wrong (encoding, length, tag).
        detail: String,
    },
}

/// Result alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
