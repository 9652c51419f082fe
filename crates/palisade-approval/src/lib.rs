//! Palisade Approval - blocking approval queue.
//!
//! High-risk tool calls are parked here until a human approves or denies
//! them (or the timeout expires). The submitter blocks on
//! [`ApprovalQueue::wait_for_decision`]; the decision side is non-blocking
//! and idempotent.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod entry;
pub mod error;
pub mod queue;

pub use entry::{ApprovalId, ApprovalState, PendingApproval};
pub use error::{ApprovalError, ApprovalResult};
pub use queue::{ApprovalQueue, DecisionOutcome, PendingFilter};
