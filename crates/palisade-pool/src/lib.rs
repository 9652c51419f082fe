//! Palisade Pool - isolated tool execution.
//!
//! A fixed-size pool of long-lived worker subprocesses, each speaking
//! newline-delimited JSON over stdin/stdout. Workers are checked out of a
//! bounded channel, held under a per-worker mutex (at most one in-flight
//! request each), and restarted with exponential backoff when they
//! misbehave.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod pool;
pub mod protocol;
mod worker;

pub use error::{PoolError, PoolResult};
pub use pool::{PoolHealth, WorkerPool};
pub use protocol::{WorkerRequest, WorkerResponse, MAX_REQUEST_BYTES};
