//! Supervisor pipeline outcomes.

use palisade_core::{RiskLevel, ToolArgs};
use serde::{Deserialize, Serialize};

/// What the supervisor decided about one tool call.
///
/// Serialized with a `status` tag so the HTTP layer can pass outcomes
/// through as response bodies unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// The call cleared every check; `args` is the sanitized form that was
    /// dispatched.
    Accepted {
        /// Risk score of the call.
        risk: RiskLevel,
        /// Sanitized arguments.
        args: ToolArgs,
    },

    /// The call is parked in the approval queue.
    PendingApproval {
        /// Approval handle to wait on or decide.
        id: String,
        /// Risk score that triggered the gate.
        risk: RiskLevel,
    },

    /// The request envelope failed schema validation.
    ValidationError {
        /// Stable 8-character correlation token; the full failure detail
        /// stays in the gateway log.
        error_token: String,
        /// Human-readable hint referencing the token.
        feedback: String,
    },

    /// The capability check refused the call.
    Denied {
        /// Stable reason token (`capability_denied`).
        reason: String,
        /// Denied capability tokens.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        denied: Vec<String>,
    },

    /// The kill-switch is active.
    BlockedKillSwitch {
        /// Operator-supplied reason.
        reason: String,
    },

    /// A rate limiter refused the call.
    RateLimited {
        /// Stable token: `rate_limit_exceeded` or
        /// `user_rate_limit_exceeded`.
        error: String,
        /// Seconds until a retry can succeed.
        retry_after_seconds: u64,
        /// The limited username (per-user limiter only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
}

impl ProcessOutcome {
    /// Whether the call may be dispatched.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Whether the call awaits a human decision.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingApproval { .. })
    }

    /// The stable machine token for refusals, `None` for accepted calls.
    #[must_use]
    pub fn error_token(&self) -> Option<&str> {
        match self {
            Self::Accepted { .. } => None,
            Self::PendingApproval { .. } => Some("pending_approval"),
            Self::ValidationError { .. } => Some("validation_error"),
            Self::Denied { .. } => Some("capability_denied"),
            Self::BlockedKillSwitch { .. } => Some("kill_switch_active"),
            Self::RateLimited { error, .. } => Some(error),
        }
    }
}
