//! Gateway lifecycle events.

use chrono::{DateTime, Utc};
use palisade_core::RiskLevel;
use serde::{Deserialize, Serialize};

/// What happened, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A call was queued for human approval.
    ApprovalPending {
        /// The approval handle.
        id: String,
        /// Tool being gated.
        tool: String,
        /// Risk score that triggered the gate.
        risk: RiskLevel,
        /// Session correlation handle, when supplied.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// A queued call was decided (or expired).
    ApprovalDecided {
        /// The approval handle.
        id: String,
        /// Terminal state: `approved`, `denied` or `expired`.
        decision: String,
    },

    /// A call cleared every check and was dispatched.
    ToolCallAccepted {
        /// The tool invoked.
        tool: String,
        /// Its risk score.
        risk: RiskLevel,
        /// The responsible principal, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actor: Option<String>,
    },

    /// A call was refused.
    ToolCallDenied {
        /// The tool refused.
        tool: String,
        /// Stable denial reason.
        reason: String,
        /// Denied capability tokens, when the capability check fired.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        denied: Vec<String>,
    },

    /// A worker subprocess is failing.
    WorkerUnhealthy {
        /// Index of the worker in the pool.
        worker: usize,
        /// Consecutive failure count.
        fail_count: u32,
    },

    /// Schema validation failures are arriving in a burst.
    ValidationErrorBurst {
        /// Failures observed inside the window.
        count: u64,
        /// Window length in seconds.
        window_seconds: u64,
    },

    /// The kill-switch was engaged or cleared.
    KillSwitchChanged {
        /// New state.
        active: bool,
        /// Operator reason (empty on clear).
        reason: String,
    },
}

impl EventKind {
    /// The wire `type` tag for this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ApprovalPending { .. } => "approval_pending",
            Self::ApprovalDecided { .. } => "approval_decided",
            Self::ToolCallAccepted { .. } => "tool_call_accepted",
            Self::ToolCallDenied { .. } => "tool_call_denied",
            Self::WorkerUnhealthy { .. } => "worker_unhealthy",
            Self::ValidationErrorBurst { .. } => "validation_error_burst",
            Self::KillSwitchChanged { .. } => "kill_switch_changed",
        }
    }
}

/// A timestamped event as delivered to subscribers and webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// When the event was published.
    pub ts: DateTime<Utc>,
    /// The event payload, flattened so the wire form is `{type, ts, ...}`.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl GatewayEvent {
    /// Stamp an event with the current time.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            ts: Utc::now(),
            kind,
        }
    }

    /// The wire `type` tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}
