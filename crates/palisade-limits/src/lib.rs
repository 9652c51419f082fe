//! Palisade Limits - request rate limiting.
//!
//! Two independent mechanisms, both read their tunables through the live
//! configuration on every check:
//!
//! - a per-client sliding window keyed by client IP (or the leftmost
//!   `X-Forwarded-For` entry), and
//! - a per-user quota keyed by the authenticated username, evaluated after
//!   the client check.
//!
//! Exhausting one does not affect the other.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod limiter;

pub use error::{RateLimitError, RateLimitResult};
pub use limiter::{client_key, RateLimiter, WindowUsage};
