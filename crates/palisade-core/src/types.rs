//! Shared vocabulary types for the gateway control plane.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Argument map of a tool call: string keys to arbitrary JSON values.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// The authenticated principal behind a request.
///
/// Resolved from a bearer token by the (external) auth layer before the call
/// enters the gateway. `System` marks internally originated calls such as
/// scheduled tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Actor {
    /// A named, authenticated user.
    User(String),
    /// An internal subsystem (e.g. `scheduler:<task-id>`).
    System(String),
}

impl Actor {
    /// The username for per-user accounting, if this is a user actor.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::User(name) => Some(name),
            Self::System(_) => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(name) | Self::System(name) => write!(f, "{name}"),
        }
    }
}

/// One agent intent: a tool id plus its arguments.
///
/// Immutable for the lifetime of a request. The supervisor replaces `args`
/// with the sanitized form before the call reaches any persistence or worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier, dotted (e.g. `file.write`).
    pub tool: String,
    /// Arguments as a JSON object.
    #[serde(default)]
    pub args: ToolArgs,
    /// Optional correlation handle tying calls to one agent session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// The authenticated principal, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
}

impl ToolCall {
    /// Create a call with no session or actor attribution.
    #[must_use]
    pub fn new(tool: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            tool: tool.into(),
            args,
            session_id: None,
            actor: None,
        }
    }

    /// Attach a session correlation id.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach the authenticated principal.
    #[must_use]
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Risk classification for a tool call.
///
/// Ordered so that combining heuristics is a plain `max`: every triggered
/// rule contributes its level and the highest wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Dispatch immediately.
    #[default]
    Low,
    /// Dispatch immediately, flagged in the audit trail.
    Medium,
    /// Requires human approval unless the manifest overrides.
    High,
}

impl RiskLevel {
    /// Parse from the manifest's lowercase string form.
    ///
    /// Unknown strings map to `Low`; a malformed manifest must not grant a
    /// call more privilege than no manifest at all.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}
