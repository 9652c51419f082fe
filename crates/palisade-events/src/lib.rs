//! Palisade Events - lifecycle event distribution.
//!
//! Small JSON events flow from the supervisor to two kinds of consumers:
//!
//! - in-process subscribers (polled by SSE handlers), each behind a bounded
//!   queue that drops rather than back-pressures, and
//! - registered webhook endpoints, delivered off-task with an HMAC-SHA256
//!   signature and bounded retries.
//!
//! Neither path may ever fail the tool call that produced the event.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bus;
pub mod error;
pub mod event;
pub mod sse;
pub mod webhook;

pub use bus::{EventBus, EventSubscription, SUBSCRIBER_QUEUE_CAPACITY};
pub use error::{EventError, EventResult};
pub use event::{EventKind, GatewayEvent};
pub use sse::{event_frame, keepalive_frame};
pub use webhook::{sign_body, verify_signature, DeliveryFailure, WebhookEndpoint, WebhookRegistry};
