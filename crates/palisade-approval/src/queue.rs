//! The approval queue.
//!
//! Entries live in memory only; a crash loses pending entries and callers
//! on the other side of the HTTP boundary see their connection close and
//! retry. Each entry carries a one-shot signal: exactly one waiter (the
//! original submitter) blocks on it, and the first terminal decision wins.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use palisade_core::{RiskLevel, SharedConfig, ToolCall};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::entry::{ApprovalId, ApprovalState, PendingApproval};
use crate::error::{ApprovalError, ApprovalResult};

/// Filter for [`ApprovalQueue::list_pending`].
#[derive(Debug, Clone, Default)]
pub struct PendingFilter {
    /// Only entries belonging to this session.
    pub session_id: Option<String>,
    /// Only entries submitted by this actor.
    pub actor: Option<String>,
}

/// Result of an `approve`/`deny` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// The decision was applied and the waiter signalled.
    Applied(ApprovalState),
    /// The entry was already terminal; nothing changed.
    AlreadyTerminal(ApprovalState),
}

struct Record {
    view: PendingApproval,
    state: ApprovalState,
    signal: Option<oneshot::Sender<ApprovalState>>,
    waiter: Option<oneshot::Receiver<ApprovalState>>,
}

/// Holds pending tool calls awaiting a human decision.
pub struct ApprovalQueue {
    config: SharedConfig,
    entries: DashMap<ApprovalId, Record>,
}

impl ApprovalQueue {
    /// Create an empty queue over the live configuration.
    #[must_use]
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Queue a call for approval. Non-blocking; returns the new id.
    ///
    /// The caller is expected to follow up with
    /// [`wait_for_decision`](Self::wait_for_decision).
    pub fn submit(&self, call: &ToolCall, risk: RiskLevel) -> ApprovalId {
        let id = ApprovalId::new();
        let now = Utc::now();
        let timeout = self.default_timeout();
        let (tx, rx) = oneshot::channel();

        let view = PendingApproval {
            id: id.clone(),
            tool: call.tool.clone(),
            args: call.args.clone(),
            session_id: call.session_id.clone(),
            actor: call.actor.clone(),
            risk,
            created_at: now,
            expires_at: now
                + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::seconds(60)),
        };

        tracing::info!(id = %id, tool = %call.tool, %risk, "approval queued");
        self.entries.insert(
            id.clone(),
            Record {
                view,
                state: ApprovalState::Pending,
                signal: Some(tx),
                waiter: Some(rx),
            },
        );
        id
    }

    /// Block until the entry is decided or the timeout expires.
    ///
    /// Returns `true` only for an approval; denial, expiry and unknown ids
    /// all return `false`. The entry is purged on return; the waiter is the
    /// last observer.
    pub async fn wait_for_decision(&self, id: &ApprovalId, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or_else(|| self.default_timeout());

        let Some(mut rx) = self
            .entries
            .get_mut(id)
            .and_then(|mut rec| rec.waiter.take())
        else {
            return false;
        };

        let state = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(state)) => state,
            // Sender dropped without a decision; treat as denied.
            Ok(Err(_)) => ApprovalState::Denied,
            Err(_elapsed) => {
                // The decision may have raced the timeout; prefer it.
                rx.try_recv().unwrap_or_else(|_| {
                    if let Some(mut rec) = self.entries.get_mut(id) {
                        if !rec.state.is_terminal() {
                            rec.state = ApprovalState::Expired;
                        }
                    }
                    ApprovalState::Expired
                })
            },
        };

        self.entries.remove(id);
        tracing::debug!(id = %id, %state, "approval wait finished");
        state.is_approved()
    }

    /// Approve a pending entry. Idempotent: a second decision is a no-op
    /// that reports the existing terminal state.
    pub fn approve(&self, id: &ApprovalId) -> ApprovalResult<DecisionOutcome> {
        self.decide(id, ApprovalState::Approved)
    }

    /// Deny a pending entry. Same idempotence rules as [`approve`](Self::approve).
    pub fn deny(&self, id: &ApprovalId) -> ApprovalResult<DecisionOutcome> {
        self.decide(id, ApprovalState::Denied)
    }

    fn decide(&self, id: &ApprovalId, decision: ApprovalState) -> ApprovalResult<DecisionOutcome> {
        let mut rec = self
            .entries
            .get_mut(id)
            .ok_or_else(|| ApprovalError::NotFound { id: id.to_string() })?;

        if rec.state.is_terminal() {
            return Ok(DecisionOutcome::AlreadyTerminal(rec.state));
        }

        rec.state = decision;
        if let Some(tx) = rec.signal.take() {
            // The waiter may already be gone; the state write above is
            // what matters for later observers.
            let _ = tx.send(decision);
        }
        tracing::info!(id = %id, %decision, "approval decided");
        Ok(DecisionOutcome::Applied(decision))
    }

    /// Snapshot of pending entries, oldest first. Terminal entries are
    /// never returned.
    #[must_use]
    pub fn list_pending(&self, filter: Option<&PendingFilter>) -> Vec<PendingApproval> {
        let mut pending: Vec<PendingApproval> = self
            .entries
            .iter()
            .filter(|rec| rec.state == ApprovalState::Pending)
            .filter(|rec| {
                filter.is_none_or(|f| {
                    let session_ok = f
                        .session_id
                        .as_deref()
                        .is_none_or(|want| rec.view.session_id.as_deref() == Some(want));
                    let actor_ok = f.actor.as_deref().is_none_or(|want| {
                        rec.view
                            .actor
                            .as_ref()
                            .is_some_and(|a| a.to_string() == want)
                    });
                    session_ok && actor_ok
                })
            })
            .map(|rec| rec.view.clone())
            .collect();
        pending.sort_by_key(|view| view.created_at);
        pending
    }

    /// Current state of an entry, if it still exists.
    #[must_use]
    pub fn status(&self, id: &ApprovalId) -> Option<ApprovalState> {
        self.entries.get(id).map(|rec| rec.state)
    }

    /// Number of entries currently held (any state).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expire entries whose deadline has passed, returning their ids.
    ///
    /// Entries with a live waiter are signalled and left for the waiter to
    /// purge; abandoned entries (submitter never waited, or gave up) are
    /// removed outright.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<ApprovalId> {
        let mut expired: Vec<(ApprovalId, bool)> = Vec::new();
        for mut rec in self.entries.iter_mut() {
            if rec.state == ApprovalState::Pending && rec.view.expires_at <= now {
                rec.state = ApprovalState::Expired;
                let has_waiter = rec.waiter.is_none();
                if let Some(tx) = rec.signal.take() {
                    let _ = tx.send(ApprovalState::Expired);
                }
                expired.push((rec.view.id.clone(), has_waiter));
            }
        }
        for (id, has_waiter) in &expired {
            if !has_waiter {
                self.entries.remove(id);
            }
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "swept expired approvals");
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }

    fn default_timeout(&self) -> Duration {
        self.config.load().approval_timeout
    }
}

impl std::fmt::Debug for ApprovalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalQueue")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::{Actor, GatewayConfig, ToolArgs};
    use serde_json::json;
    use std::sync::Arc;

    fn args_of(value: serde_json::Value) -> ToolArgs {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn make_queue() -> ApprovalQueue {
        ApprovalQueue::new(GatewayConfig::default().into_shared())
    }

    fn exec_call() -> ToolCall {
        ToolCall::new("system.exec", args_of(json!({"cmd": "rm -rf /"})))
    }

    #[test]
    fn test_submit_returns_8_hex_id() {
        let queue = make_queue();
        let id = queue.submit(&exec_call(), RiskLevel::High);
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(queue.status(&id), Some(ApprovalState::Pending));
    }

    #[test]
    fn test_list_pending_contains_submission() {
        let queue = make_queue();
        let id = queue.submit(&exec_call(), RiskLevel::High);

        let pending = queue.list_pending(None);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].tool, "system.exec");
        assert_eq!(pending[0].risk, RiskLevel::High);
    }

    #[test]
    fn test_list_pending_session_filter() {
        let queue = make_queue();
        queue.submit(&exec_call().with_session("a"), RiskLevel::High);
        queue.submit(&exec_call().with_session("b"), RiskLevel::High);

        let filter = PendingFilter {
            session_id: Some("a".to_string()),
            actor: None,
        };
        let pending = queue.list_pending(Some(&filter));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].session_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_list_pending_actor_filter() {
        let queue = make_queue();
        queue.submit(
            &exec_call().with_actor(Actor::User("alice".into())),
            RiskLevel::High,
        );
        queue.submit(
            &exec_call().with_actor(Actor::User("bob".into())),
            RiskLevel::High,
        );

        let filter = PendingFilter {
            session_id: None,
            actor: Some("bob".to_string()),
        };
        let pending = queue.list_pending(Some(&filter));
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_approve_wakes_waiter_with_true() {
        let queue = Arc::new(make_queue());
        let id = queue.submit(&exec_call(), RiskLevel::High);

        let waiter = {
            let queue = Arc::clone(&queue);
            let id = id.clone();
            tokio::spawn(async move { queue.wait_for_decision(&id, None).await })
        };

        tokio::task::yield_now().await;
        let outcome = queue.approve(&id).unwrap();
        assert_eq!(outcome, DecisionOutcome::Applied(ApprovalState::Approved));

        assert!(waiter.await.unwrap());
        // The waiter was the last observer; the entry is purged.
        assert!(queue.status(&id).is_none());
        assert!(queue.list_pending(None).is_empty());
    }

    #[tokio::test]
    async fn test_deny_wakes_waiter_with_false() {
        let queue = Arc::new(make_queue());
        let id = queue.submit(&exec_call(), RiskLevel::High);

        let waiter = {
            let queue = Arc::clone(&queue);
            let id = id.clone();
            tokio::spawn(async move { queue.wait_for_decision(&id, None).await })
        };

        tokio::task::yield_now().await;
        queue.deny(&id).unwrap();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_times_out_with_false() {
        let queue = make_queue();
        let id = queue.submit(&exec_call(), RiskLevel::High);

        let approved = queue
            .wait_for_decision(&id, Some(Duration::from_millis(20)))
            .await;
        assert!(!approved);
        assert!(queue.status(&id).is_none());
    }

    #[tokio::test]
    async fn test_wait_unknown_id_is_false() {
        let queue = make_queue();
        assert!(
            !queue
                .wait_for_decision(&ApprovalId::from("deadbeef"), Some(Duration::from_millis(5)))
                .await
        );
    }

    #[test]
    fn test_second_decision_is_noop() {
        let queue = make_queue();
        let id = queue.submit(&exec_call(), RiskLevel::High);

        assert_eq!(
            queue.approve(&id).unwrap(),
            DecisionOutcome::Applied(ApprovalState::Approved)
        );
        assert_eq!(
            queue.approve(&id).unwrap(),
            DecisionOutcome::AlreadyTerminal(ApprovalState::Approved)
        );
        // Deny after approve does not change the terminal state.
        assert_eq!(
            queue.deny(&id).unwrap(),
            DecisionOutcome::AlreadyTerminal(ApprovalState::Approved)
        );
        assert_eq!(queue.status(&id), Some(ApprovalState::Approved));
    }

    #[test]
    fn test_decide_unknown_id_errors() {
        let queue = make_queue();
        assert!(queue.approve(&ApprovalId::from("deadbeef")).is_err());
    }

    #[test]
    fn test_terminal_entries_not_listed() {
        let queue = make_queue();
        let id = queue.submit(&exec_call(), RiskLevel::High);
        queue.approve(&id).unwrap();
        assert!(queue.list_pending(None).is_empty());
    }

    #[test]
    fn test_sweep_removes_abandoned_entries() {
        let queue = make_queue();
        let id = queue.submit(&exec_call(), RiskLevel::High);

        // Nothing to sweep yet.
        assert!(queue.sweep_expired(Utc::now()).is_empty());

        let future = Utc::now() + chrono::Duration::seconds(3600);
        assert_eq!(queue.sweep_expired(future), vec![id.clone()]);
        assert!(queue.status(&id).is_none());
    }

    #[tokio::test]
    async fn test_sweep_wakes_live_waiter() {
        let queue = Arc::new(make_queue());
        let id = queue.submit(&exec_call(), RiskLevel::High);

        let waiter = {
            let queue = Arc::clone(&queue);
            let id = id.clone();
            tokio::spawn(async move {
                queue
                    .wait_for_decision(&id, Some(Duration::from_secs(30)))
                    .await
            })
        };

        tokio::task::yield_now().await;
        let future = Utc::now() + chrono::Duration::seconds(3600);
        assert_eq!(queue.sweep_expired(future).len(), 1);

        assert!(!waiter.await.unwrap());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_decision_racing_timeout_prefers_decision() {
        let queue = Arc::new(make_queue());
        let id = queue.submit(&exec_call(), RiskLevel::High);

        // Decide before the waiter even starts; the buffered signal must
        // win over the (immediate) timeout.
        queue.approve(&id).unwrap();
        let approved = queue.wait_for_decision(&id, Some(Duration::ZERO)).await;
        assert!(approved);
    }
}
