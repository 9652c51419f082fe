//! Process-wide halt gate.
//!
//! An operator can stop every tool call instantly by engaging the
//! kill-switch; the supervisor checks it before anything else, including
//! rate limiting, so a runaway agent cannot burn quota while halted.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Snapshot of the kill-switch state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchStatus {
    /// Whether the gateway is halted.
    pub active: bool,
    /// Operator-supplied reason (empty when inactive).
    pub reason: String,
}

/// Process-wide boolean plus reason string.
#[derive(Debug, Default)]
pub struct KillSwitch {
    state: RwLock<KillSwitchStatus>,
}

impl Default for KillSwitchStatus {
    fn default() -> Self {
        Self {
            active: false,
            reason: String::new(),
        }
    }
}

impl KillSwitch {
    /// Create an inactive kill-switch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Halt the gateway with a reason. Idempotent; the latest reason wins.
    pub fn engage(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(%reason, "kill-switch engaged");
        *self.state.write() = KillSwitchStatus {
            active: true,
            reason,
        };
    }

    /// Resume normal operation.
    pub fn clear(&self) {
        tracing::info!("kill-switch cleared");
        *self.state.write() = KillSwitchStatus::default();
    }

    /// Current state snapshot.
    #[must_use]
    pub fn status(&self) -> KillSwitchStatus {
        self.state.read().clone()
    }

    /// The blocking reason when active, `None` otherwise.
    #[must_use]
    pub fn blocking_reason(&self) -> Option<String> {
        let state = self.state.read();
        state.active.then(|| state.reason.clone())
    }
}
