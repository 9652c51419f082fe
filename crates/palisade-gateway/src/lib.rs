//! Palisade Gateway - the request control plane.
//!
//! The [`Supervisor`] owns the screening pipeline every tool call goes
//! through (kill-switch, rate limits, schema validation, sanitization,
//! capability check, risk scoring, approval gating) and is the only
//! component that mutates the approval queue or writes tool-call audit
//! records. Around it live the [`Scheduler`] (periodic tasks re-entering
//! the pipeline), [`compaction`] (history summarization) and an in-process
//! [`metrics`] registry.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod compaction;
pub mod error;
pub mod metrics;
pub mod outcome;
pub mod scheduler;
pub mod schema;
pub mod supervisor;

pub use compaction::{ChatMessage, CompletionAdapter};
pub use error::{GatewayError, GatewayResult};
pub use metrics::MetricsRegistry;
pub use outcome::ProcessOutcome;
pub use scheduler::{ScheduledTask, Scheduler, TaskRun, TaskUpdate};
pub use schema::EnvelopeValidator;
pub use supervisor::Supervisor;
