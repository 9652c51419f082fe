//! Palisade Audit - append-only decision log.
//!
//! Every gateway decision lands here as one JSON object per line. With a
//! configured key, each line is sealed with AES-256-GCM before it touches
//! disk; readers tolerate files that mix plaintext and encrypted lines
//! (legacy rotation).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod cipher;
pub mod error;
pub mod log;
pub mod record;

pub use cipher::AuditCipher;
pub use error::{AuditError, AuditResult};
pub use log::AuditLog;
pub use record::AuditRecord;
