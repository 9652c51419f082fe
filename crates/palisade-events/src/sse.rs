//! Server-sent-events framing.
//!
//! The HTTP layer owns the stream; these helpers only produce the frames so
//! the wire format is pinned in one place.

use crate::event::GatewayEvent;

/// Format an event as an SSE frame: `event: <type>\ndata: <json>\n\n`.
///
/// Falls back to a `{}` body if serialization fails, which cannot happen
/// for the event types defined in this crate.
#[must_use]
pub fn event_frame(event: &GatewayEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("event: {}\ndata: {}\n\n", event.event_type(), data)
}

/// The keepalive comment frame sent every poll interval.
#[must_use]
pub fn keepalive_frame() -> &'static str {
    ": keepalive\n\n"
}
