//! Approval entry types.

use chrono::{DateTime, Utc};
use palisade_core::{Actor, RiskLevel, ToolArgs};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique approval handle: 8 hex characters, short enough to read aloud.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalId(String);

impl ApprovalId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(simple[..8].to_string())
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ApprovalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ApprovalId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Lifecycle state of an approval entry. Transitions are monotonic: once
/// terminal, the entry is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// Awaiting a decision.
    Pending,
    /// A human approved the call.
    Approved,
    /// A human denied the call.
    Denied,
    /// The wait timed out before a decision arrived.
    Expired,
}

impl ApprovalState {
    /// Whether this state is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the call may proceed.
    #[must_use]
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Denied => write!(f, "denied"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Public view of a queued approval, as returned by `list_pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    /// The approval handle.
    pub id: ApprovalId,
    /// Tool being gated.
    pub tool: String,
    /// Sanitized arguments.
    pub args: ToolArgs,
    /// Session correlation handle, when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Requesting principal, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
    /// Risk score that triggered the gate.
    pub risk: RiskLevel,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
    /// When the entry auto-expires.
    pub expires_at: DateTime<Utc>,
}

impl PendingApproval {
    /// Seconds until expiry, clamped at zero.
    #[must_use]
    pub fn expires_in(&self, now: DateTime<Utc>) -> f64 {
        let secs = (self.expires_at - now).num_milliseconds() as f64 / 1000.0;
        secs.max(0.0)
    }
}
