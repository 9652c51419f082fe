//! Audit record shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audited event. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the event happened (RFC 3339, UTC).
    pub ts: DateTime<Utc>,
    /// Event name, e.g. `tool_call_accepted`.
    pub event: String,
    /// The responsible principal, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Structured event payload.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AuditRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(
        event: impl Into<String>,
        actor: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            ts: Utc::now(),
            event: event.into(),
            actor,
            details,
        }
    }
}
