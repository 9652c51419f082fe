//! The supervisor pipeline.
//!
//! Check order is fixed and must not be reordered:
//!
//! 1. kill-switch (before rate limiting, so an operator can halt a runaway
//!    agent without burning its quota)
//! 2. per-client rate limit
//! 3. per-user rate limit
//! 4. envelope schema validation
//! 5. argument sanitization
//! 6. capability check
//! 7. risk scoring
//! 8. approval gate
//!
//! Audit records for a call are written before its outcome is returned, and
//! failures in audit, bus or webhook delivery never fail the call itself.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use palisade_approval::{ApprovalId, ApprovalQueue, ApprovalState, DecisionOutcome, PendingFilter};
use palisade_audit::{AuditLog, AuditRecord};
use palisade_core::{Actor, KillSwitch, RiskLevel, SharedConfig, ToolCall};
use palisade_events::{EventBus, EventKind, GatewayEvent, WebhookRegistry};
use palisade_limits::{RateLimitError, RateLimiter};
use palisade_policy::{compute_risk, sanitize, CapabilityVerifier};
use palisade_pool::WorkerPool;

use crate::error::GatewayResult;
use crate::metrics::MetricsRegistry;
use crate::outcome::ProcessOutcome;
use crate::schema::EnvelopeValidator;

/// Validation failures inside this window trigger a burst event.
const VALIDATION_BURST_WINDOW: Duration = Duration::from_secs(60);
/// How many failures make a burst.
const VALIDATION_BURST_THRESHOLD: usize = 10;

/// Tracks validation failures and fires once per threshold crossing.
struct BurstDetector {
    hits: Mutex<VecDeque<Instant>>,
}

impl BurstDetector {
    fn new() -> Self {
        Self {
            hits: Mutex::new(VecDeque::new()),
        }
    }

    fn record(&self) -> Option<u64> {
        let now = Instant::now();
        let mut hits = self.hits.lock();
        while let Some(oldest) = hits.front() {
            if now.duration_since(*oldest) > VALIDATION_BURST_WINDOW {
                hits.pop_front();
            } else {
                break;
            }
        }
        hits.push_back(now);
        (hits.len() == VALIDATION_BURST_THRESHOLD).then(|| hits.len() as u64)
    }
}

/// Orchestrates the screening pipeline and owns its subcomponents.
///
/// This is the only component that mutates the approval queue or writes
/// tool-call audit records; everything else emits events it consumes.
pub struct Supervisor {
    config: SharedConfig,
    kill_switch: Arc<KillSwitch>,
    limiter: Arc<RateLimiter>,
    verifier: CapabilityVerifier,
    queue: Arc<ApprovalQueue>,
    audit: Arc<AuditLog>,
    bus: EventBus,
    webhooks: Arc<WebhookRegistry>,
    pool: Option<Arc<WorkerPool>>,
    validator: EnvelopeValidator,
    metrics: Arc<MetricsRegistry>,
    burst: BurstDetector,
}

impl Supervisor {
    /// Build a supervisor with fresh subcomponents over `config`.
    #[must_use]
    pub fn new(config: SharedConfig, audit: Arc<AuditLog>) -> Self {
        Self {
            kill_switch: Arc::new(KillSwitch::new()),
            limiter: Arc::new(RateLimiter::new(config.clone())),
            verifier: CapabilityVerifier::new(config.clone()),
            queue: Arc::new(ApprovalQueue::new(config.clone())),
            bus: EventBus::new(),
            webhooks: Arc::new(WebhookRegistry::new()),
            pool: None,
            validator: EnvelopeValidator::new(),
            metrics: Arc::new(MetricsRegistry::new()),
            burst: BurstDetector::new(),
            config,
            audit,
        }
    }

    /// Attach a worker pool for dispatch.
    #[must_use]
    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Use a persisted webhook registry instead of the in-memory default.
    #[must_use]
    pub fn with_webhooks(mut self, webhooks: Arc<WebhookRegistry>) -> Self {
        self.webhooks = webhooks;
        self
    }

    /// Use a deployment-specific envelope schema.
    #[must_use]
    pub fn with_validator(mut self, validator: EnvelopeValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Screen one tool-call envelope from an external client.
    pub async fn process_call(
        &self,
        envelope: &Value,
        client_key: &str,
        actor: Option<Actor>,
    ) -> ProcessOutcome {
        // 1. Kill-switch, before anything else.
        if let Some(reason) = self.kill_switch.blocking_reason() {
            self.metrics.inc("tool_calls_blocked_total", &[("reason", "kill_switch")]);
            return ProcessOutcome::BlockedKillSwitch { reason };
        }

        // 2. Per-client sliding window.
        if let Err(err) = self.limiter.check_client(client_key) {
            return self.rate_limited(err);
        }

        // 3. Per-user quota.
        if let Some(user) = actor.as_ref().and_then(Actor::username) {
            if let Err(err) = self.limiter.check_user(user) {
                return self.rate_limited(err);
            }
        }

        // 4. Envelope schema.
        let call = match self.validate_envelope(envelope) {
            Ok(call) => call,
            Err(outcome) => return outcome,
        };
        let call = match actor {
            Some(actor) => call.with_actor(actor),
            None => call,
        };

        self.screen(call)
    }

    /// Screen an internally originated call (scheduler). Skips both rate
    /// limiters and schema validation but still honors the kill-switch and
    /// the full policy pipeline.
    pub fn process_internal(&self, call: ToolCall) -> ProcessOutcome {
        if let Some(reason) = self.kill_switch.blocking_reason() {
            self.metrics.inc("tool_calls_blocked_total", &[("reason", "kill_switch")]);
            return ProcessOutcome::BlockedKillSwitch { reason };
        }
        self.screen(call)
    }

    /// Steps 5-8: sanitize, capability check, risk score, approval gate.
    fn screen(&self, mut call: ToolCall) -> ProcessOutcome {
        call.args = sanitize(&call.args);
        let actor_name = call.actor.as_ref().map(ToString::to_string);

        // 6. Capability check against the manifest.
        let manifest = self.verifier.manifest_for(&call.tool);
        let check = match &manifest {
            Some(manifest) => self.verifier.check_manifest(manifest, &call.args),
            // Missing manifest: the verifier applies the unknown-tool policy.
            None => self.verifier.check(&call.tool, &call.args),
        };
        if !check.allowed {
            self.metrics.inc("tool_calls_denied_total", &[("tool", call.tool.as_str())]);
            self.record_audit(
                "tool_call_denied",
                actor_name.clone(),
                json!({"tool": call.tool, "denied": check.denied}),
            );
            self.emit(EventKind::ToolCallDenied {
                tool: call.tool.clone(),
                reason: "capability_denied".to_string(),
                denied: check.denied.clone(),
            });
            return ProcessOutcome::Denied {
                reason: "capability_denied".to_string(),
                denied: check.denied,
            };
        }

        // 7. Risk score; the manifest is the floor, heuristics only raise.
        let risk = compute_risk(&call.tool, &call.args, manifest.as_ref());

        // 8. Approval gate. An explicit `requires_approval: false` exempts
        // even high-risk calls; absence defers to the risk score.
        let requires_approval = match manifest.as_ref().and_then(|m| m.requires_approval) {
            Some(explicit) => explicit,
            None => risk == RiskLevel::High,
        };
        if requires_approval {
            let id = self.queue.submit(&call, risk);
            self.metrics.inc("approvals_pending_total", &[("tool", call.tool.as_str())]);
            self.record_audit(
                "approval_pending",
                actor_name,
                json!({"id": id.to_string(), "tool": call.tool, "risk": risk, "args": call.args}),
            );
            self.emit(EventKind::ApprovalPending {
                id: id.to_string(),
                tool: call.tool.clone(),
                risk,
                session_id: call.session_id.clone(),
            });
            return ProcessOutcome::PendingApproval {
                id: id.to_string(),
                risk,
            };
        }

        self.metrics.inc("tool_calls_total", &[("tool", call.tool.as_str())]);
        self.record_audit(
            "tool_call_accepted",
            actor_name.clone(),
            json!({"tool": call.tool, "risk": risk, "args": call.args}),
        );
        self.emit(EventKind::ToolCallAccepted {
            tool: call.tool.clone(),
            risk,
            actor: actor_name,
        });
        ProcessOutcome::Accepted {
            risk,
            args: call.args,
        }
    }

    fn validate_envelope(&self, envelope: &Value) -> Result<ToolCall, ProcessOutcome> {
        let errors = match self.validator.validate(envelope) {
            Ok(()) => match serde_json::from_value::<ToolCall>(envelope.clone()) {
                Ok(call) => return Ok(call),
                Err(err) => vec![err.to_string()],
            },
            Err(errors) => errors,
        };

        let error_token = ApprovalId::new().to_string();
        tracing::warn!(token = %error_token, ?errors, "envelope validation failed");
        self.metrics.inc("validation_errors_total", &[]);
        if let Some(count) = self.burst.record() {
            self.emit(EventKind::ValidationErrorBurst {
                count,
                window_seconds: VALIDATION_BURST_WINDOW.as_secs(),
            });
        }
        Err(ProcessOutcome::ValidationError {
            feedback: format!("request envelope rejected; quote token {error_token} when reporting"),
            error_token,
        })
    }

    fn rate_limited(&self, err: RateLimitError) -> ProcessOutcome {
        match err {
            RateLimitError::ClientLimitExceeded {
                retry_after_seconds,
            } => {
                self.metrics.inc("rate_limited_total", &[("scope", "client")]);
                ProcessOutcome::RateLimited {
                    error: "rate_limit_exceeded".to_string(),
                    retry_after_seconds,
                    user: None,
                }
            },
            RateLimitError::UserLimitExceeded {
                user,
                retry_after_seconds,
            } => {
                self.metrics.inc("rate_limited_total", &[("scope", "user")]);
                ProcessOutcome::RateLimited {
                    error: "user_rate_limit_exceeded".to_string(),
                    retry_after_seconds,
                    user: Some(user),
                }
            },
        }
    }

    // -- approval surface --

    /// Block until the approval is decided or the configured timeout
    /// expires. `true` only for an explicit approval.
    pub async fn wait_for_decision(&self, id: &str) -> bool {
        self.queue
            .wait_for_decision(&ApprovalId::from(id), None)
            .await
    }

    /// Approve a pending call and notify subscribers.
    pub fn approve(&self, id: &str) -> GatewayResult<ApprovalState> {
        self.decide(id, true)
    }

    /// Deny a pending call and notify subscribers.
    pub fn deny(&self, id: &str) -> GatewayResult<ApprovalState> {
        self.decide(id, false)
    }

    fn decide(&self, id: &str, approve: bool) -> GatewayResult<ApprovalState> {
        let approval_id = ApprovalId::from(id);
        let outcome = if approve {
            self.queue.approve(&approval_id)?
        } else {
            self.queue.deny(&approval_id)?
        };
        match outcome {
            DecisionOutcome::Applied(state) => {
                let decision = state.to_string();
                self.metrics
                    .inc("approval_decisions_total", &[("decision", decision.as_str())]);
                self.record_audit(
                    "approval_decided",
                    None,
                    json!({"id": id, "decision": state.to_string()}),
                );
                self.emit(EventKind::ApprovalDecided {
                    id: id.to_string(),
                    decision: state.to_string(),
                });
                Ok(state)
            },
            DecisionOutcome::AlreadyTerminal(state) => Ok(state),
        }
    }

    /// Pending approvals snapshot.
    #[must_use]
    pub fn list_pending(&self, filter: Option<&PendingFilter>) -> Vec<palisade_approval::PendingApproval> {
        self.queue.list_pending(filter)
    }

    /// Expire overdue approvals, notifying subscribers per entry.
    pub fn sweep_approvals(&self) {
        for id in self.queue.sweep_expired(Utc::now()) {
            self.record_audit(
                "approval_decided",
                None,
                json!({"id": id.to_string(), "decision": "expired"}),
            );
            self.emit(EventKind::ApprovalDecided {
                id: id.to_string(),
                decision: ApprovalState::Expired.to_string(),
            });
        }
    }

    // -- kill-switch surface --

    /// Halt the gateway.
    pub fn engage_kill_switch(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.kill_switch.engage(reason.clone());
        self.record_audit("kill_switch_changed", None, json!({"active": true, "reason": reason}));
        self.emit(EventKind::KillSwitchChanged {
            active: true,
            reason,
        });
    }

    /// Resume normal operation.
    pub fn clear_kill_switch(&self) {
        self.kill_switch.clear();
        self.record_audit("kill_switch_changed", None, json!({"active": false, "reason": ""}));
        self.emit(EventKind::KillSwitchChanged {
            active: false,
            reason: String::new(),
        });
    }

    // -- dispatch --

    /// Run an accepted action on the worker pool.
    pub async fn dispatch(&self, action: &str, params: Value) -> GatewayResult<Value> {
        let pool = self
            .pool
            .as_ref()
            .ok_or(palisade_pool::PoolError::Unavailable)?;
        let result = pool.execute(action, params, None).await?;
        Ok(result)
    }

    // -- observability --

    /// Health snapshot for the admin surface. The `ALL` capability escape
    /// hatch is surfaced here so it cannot hide in production.
    #[must_use]
    pub fn health_snapshot(&self) -> Value {
        let config = self.config.load();
        json!({
            "kill_switch": self.kill_switch.status(),
            "capabilities_all": config.allowed_caps.is_all(),
            "pending_approvals": self.queue.list_pending(None).len(),
            "pool": self.pool.as_ref().map(|pool| pool.health()),
            "subscribers": self.bus.subscriber_count(),
            "audit_encrypted": self.audit.is_encrypted(),
        })
    }

    fn record_audit(&self, event: &str, actor: Option<String>, details: Value) {
        let record = AuditRecord::new(event, actor, details);
        if let Err(err) = self.audit.append(&record) {
            self.metrics.inc("audit_write_errors_total", &[]);
            tracing::warn!(%err, event, "audit write failed");
        }
    }

    fn emit(&self, kind: EventKind) {
        let event = GatewayEvent::new(kind);
        self.webhooks.fire(&event);
        self.bus.publish_event(event);
    }

    // -- accessors --

    /// The live configuration handle.
    #[must_use]
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// The kill-switch.
    #[must_use]
    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    /// The rate limiter (admin resets).
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The event bus (SSE handlers subscribe here).
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The webhook registry.
    #[must_use]
    pub fn webhooks(&self) -> &WebhookRegistry {
        &self.webhooks
    }

    /// The metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// The worker pool, when attached.
    #[must_use]
    pub fn pool(&self) -> Option<&Arc<WorkerPool>> {
        self.pool.as_ref()
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("pool", &self.pool.is_some())
            .field("pending", &self.queue.list_pending(None).len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::{GatewayConfig, RateLimitSettings};
    use palisade_policy::ToolManifest;
    use std::path::Path;

    struct Fixture {
        supervisor: Supervisor,
        audit: Arc<AuditLog>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with(|_| {})
    }

    fn fixture_with(tweak: impl FnOnce(&mut GatewayConfig)) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.manifest_dir = dir.path().join("manifests");
        tweak(&mut config);
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.log"), None).unwrap());
        let supervisor = Supervisor::new(config.into_shared(), Arc::clone(&audit));
        Fixture {
            supervisor,
            audit,
            _dir: dir,
        }
    }

    fn write_manifest(fx: &Fixture, tool: &str, body: &str) {
        let dir = fx.supervisor.config().load().manifest_dir.clone();
        let path = ToolManifest::path_for(Path::new(&dir), tool).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    async fn call(fx: &Fixture, envelope: Value) -> ProcessOutcome {
        fx.supervisor.process_call(&envelope, "1.2.3.4", None).await
    }

    // -- concrete scenarios --

    #[tokio::test]
    async fn test_safe_low_risk_pass_through() {
        let fx = fixture();
        let outcome = call(&fx, json!({"tool": "echo", "args": {"text": "hi"}})).await;
        match outcome {
            ProcessOutcome::Accepted { risk, args } => {
                assert_eq!(risk, RiskLevel::Low);
                assert_eq!(args["text"], "hi");
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sanitization_in_response_and_audit() {
        let fx = fixture();
        let outcome = call(
            &fx,
            json!({"tool": "echo", "args": {"text": "hi", "token": "abc123"}}),
        )
        .await;
        match outcome {
            ProcessOutcome::Accepted { args, .. } => {
                assert_eq!(args["token"], "[REDACTED]");
                assert_eq!(args["text"], "hi");
            },
            other => panic!("unexpected outcome: {other:?}"),
        }

        let records = fx.audit.read_all().unwrap();
        let accepted = records
            .iter()
            .find(|r| r.event == "tool_call_accepted")
            .unwrap();
        assert_eq!(accepted.details["args"]["token"], "[REDACTED]");
    }

    #[tokio::test]
    async fn test_high_risk_tool_queues_approval() {
        let fx = fixture();
        let outcome = call(
            &fx,
            json!({"tool": "system.exec", "args": {"cmd": "rm -rf /"}}),
        )
        .await;
        let ProcessOutcome::PendingApproval { id, risk } = outcome else {
            panic!("expected pending approval");
        };
        assert_eq!(risk, RiskLevel::High);
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let pending = fx.supervisor.list_pending(None);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tool, "system.exec");

        // Approve, then the waiter observes true and the entry is gone.
        assert_eq!(
            fx.supervisor.approve(&id).unwrap(),
            ApprovalState::Approved
        );
        assert!(fx.supervisor.wait_for_decision(&id).await);
        assert!(fx.supervisor.list_pending(None).is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_promotes_unknown_tool_to_high() {
        let fx = fixture();
        let outcome = call(
            &fx,
            json!({"tool": "custom.unknown", "args": {"path": "../../etc/passwd"}}),
        )
        .await;
        let ProcessOutcome::PendingApproval { risk, .. } = outcome else {
            panic!("expected pending approval");
        };
        assert_eq!(risk, RiskLevel::High);
    }

    #[tokio::test]
    async fn test_rate_limit_four_requests() {
        let fx = fixture_with(|config| {
            config.rate_limits = RateLimitSettings {
                enabled: true,
                client_max_requests: 3,
                client_burst: 0,
                ..RateLimitSettings::default()
            };
        });
        for _ in 0..3 {
            let outcome = call(&fx, json!({"tool": "echo", "args": {"text": "hi"}})).await;
            assert!(outcome.is_accepted());
        }
        let outcome = call(&fx, json!({"tool": "echo", "args": {"text": "hi"}})).await;
        let ProcessOutcome::RateLimited {
            error,
            retry_after_seconds,
            user,
        } = outcome
        else {
            panic!("expected rate limited");
        };
        assert_eq!(error, "rate_limit_exceeded");
        assert!(retry_after_seconds > 0);
        assert!(user.is_none());
    }

    // -- pipeline ordering and gates --

    #[tokio::test]
    async fn test_kill_switch_blocks_before_everything() {
        let fx = fixture_with(|config| {
            // Even an exhausted rate limit must not mask the kill-switch.
            config.rate_limits.client_max_requests = 0;
            config.rate_limits.client_burst = 0;
        });
        fx.supervisor.engage_kill_switch("incident");

        let outcome = call(&fx, json!({"tool": "noop", "args": {}})).await;
        let ProcessOutcome::BlockedKillSwitch { reason } = outcome else {
            panic!("expected kill switch block");
        };
        assert_eq!(reason, "incident");

        fx.supervisor.clear_kill_switch();
        let outcome = call(&fx, json!({"tool": "noop", "args": {}})).await;
        assert!(matches!(outcome, ProcessOutcome::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_validation_error_has_stable_token() {
        let fx = fixture();
        let outcome = call(&fx, json!({"not_a_tool_key": "bad"})).await;
        let ProcessOutcome::ValidationError {
            error_token,
            feedback,
        } = outcome
        else {
            panic!("expected validation error");
        };
        assert_eq!(error_token.len(), 8);
        assert!(feedback.contains("token"));
        assert!(feedback.contains(&error_token));
    }

    #[tokio::test]
    async fn test_validation_burst_event() {
        let fx = fixture_with(|config| config.rate_limits.enabled = false);
        let mut sub = fx.supervisor.bus().subscribe();

        for _ in 0..VALIDATION_BURST_THRESHOLD {
            let _ = call(&fx, json!({"bogus": true})).await;
        }

        let mut saw_burst = false;
        while let Some(event) = sub.try_recv() {
            if event.event_type() == "validation_error_burst" {
                saw_burst = true;
            }
        }
        assert!(saw_burst);
    }

    #[tokio::test]
    async fn test_capability_denied() {
        let fx = fixture();
        write_manifest(
            &fx,
            "file.write",
            r#"{"tool": "file.write", "required_capabilities": ["fs.write"]}"#,
        );

        let outcome = call(
            &fx,
            json!({"tool": "file.write", "args": {"path": "/tmp/x", "content": "y"}}),
        )
        .await;
        let ProcessOutcome::Denied { reason, denied } = outcome else {
            panic!("expected denial");
        };
        assert_eq!(reason, "capability_denied");
        assert_eq!(denied, vec!["fs.write".to_string()]);

        let records = fx.audit.read_all().unwrap();
        assert!(records.iter().any(|r| r.event == "tool_call_denied"));
    }

    #[tokio::test]
    async fn test_manifest_requires_approval_false_overrides_high_risk() {
        let fx = fixture_with(|config| {
            config.allowed_caps = palisade_core::AllowedCaps::parse("sys.exec");
        });
        write_manifest(
            &fx,
            "system.exec",
            r#"{
                "tool": "system.exec",
                "required_capabilities": ["sys.exec"],
                "risk_level": "high",
                "requires_approval": false
            }"#,
        );

        let outcome = call(&fx, json!({"tool": "system.exec", "args": {"cmd": "ls"}})).await;
        match outcome {
            ProcessOutcome::Accepted { risk, .. } => assert_eq!(risk, RiskLevel::High),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_manifest_requires_approval_true_gates_low_risk() {
        let fx = fixture();
        write_manifest(
            &fx,
            "pdf.read",
            r#"{"tool": "pdf.read", "requires_approval": true}"#,
        );

        let outcome = call(&fx, json!({"tool": "pdf.read", "args": {}})).await;
        assert!(outcome.is_pending());
    }

    #[tokio::test]
    async fn test_medium_risk_accepted_immediately() {
        let fx = fixture();
        let outcome = call(&fx, json!({"tool": "file.read", "args": {"path": "/tmp/safe.txt"}}))
            .await;
        match outcome {
            ProcessOutcome::Accepted { risk, .. } => assert_eq!(risk, RiskLevel::Medium),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_user_rate_limit_carries_username() {
        let fx = fixture_with(|config| {
            config.rate_limits.user_max_requests = 2;
        });
        let actor = Actor::User("alice".to_string());
        for _ in 0..2 {
            let outcome = fx
                .supervisor
                .process_call(
                    &json!({"tool": "echo", "args": {}}),
                    "1.2.3.4",
                    Some(actor.clone()),
                )
                .await;
            assert!(outcome.is_accepted());
        }
        let outcome = fx
            .supervisor
            .process_call(&json!({"tool": "echo", "args": {}}), "1.2.3.4", Some(actor))
            .await;
        let ProcessOutcome::RateLimited { error, user, .. } = outcome else {
            panic!("expected user rate limit");
        };
        assert_eq!(error, "user_rate_limit_exceeded");
        assert_eq!(user.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_internal_calls_bypass_rate_limits() {
        let fx = fixture_with(|config| {
            config.rate_limits.client_max_requests = 0;
            config.rate_limits.client_burst = 0;
            config.rate_limits.user_max_requests = 0;
        });
        let task_call = ToolCall::new("echo", palisade_core::ToolArgs::new())
            .with_actor(Actor::System("scheduler:ab12".to_string()));
        assert!(fx.supervisor.process_internal(task_call).is_accepted());
    }

    #[tokio::test]
    async fn test_internal_calls_honor_kill_switch() {
        let fx = fixture();
        fx.supervisor.engage_kill_switch("halt");
        let outcome = fx
            .supervisor
            .process_internal(ToolCall::new("echo", palisade_core::ToolArgs::new()));
        assert!(matches!(outcome, ProcessOutcome::BlockedKillSwitch { .. }));
    }

    // -- events and decisions --

    #[tokio::test]
    async fn test_events_for_accept_and_pending() {
        let fx = fixture();
        let mut sub = fx.supervisor.bus().subscribe();

        call(&fx, json!({"tool": "echo", "args": {}})).await;
        call(&fx, json!({"tool": "system.exec", "args": {}})).await;

        let first = sub.try_recv().unwrap();
        assert_eq!(first.event_type(), "tool_call_accepted");
        let second = sub.try_recv().unwrap();
        assert_eq!(second.event_type(), "approval_pending");
    }

    #[tokio::test]
    async fn test_deny_then_wait_is_false() {
        let fx = fixture();
        let outcome = call(&fx, json!({"tool": "system.exec", "args": {}})).await;
        let ProcessOutcome::PendingApproval { id, .. } = outcome else {
            panic!("expected pending");
        };

        let mut sub = fx.supervisor.bus().subscribe();
        assert_eq!(fx.supervisor.deny(&id).unwrap(), ApprovalState::Denied);
        assert!(!fx.supervisor.wait_for_decision(&id).await);

        let event = sub.try_recv().unwrap();
        assert_eq!(event.event_type(), "approval_decided");
    }

    #[tokio::test]
    async fn test_second_decision_is_noop() {
        let fx = fixture();
        let ProcessOutcome::PendingApproval { id, .. } =
            call(&fx, json!({"tool": "system.exec", "args": {}})).await
        else {
            panic!("expected pending");
        };
        assert_eq!(fx.supervisor.approve(&id).unwrap(), ApprovalState::Approved);
        // deny after approve does not change the terminal state.
        assert_eq!(fx.supervisor.deny(&id).unwrap(), ApprovalState::Approved);
    }

    #[tokio::test]
    async fn test_sweep_emits_expiry_events() {
        let fx = fixture_with(|config| {
            config.approval_timeout = Duration::from_millis(0);
        });
        let ProcessOutcome::PendingApproval { .. } =
            call(&fx, json!({"tool": "system.exec", "args": {}})).await
        else {
            panic!("expected pending");
        };

        let mut sub = fx.supervisor.bus().subscribe();
        fx.supervisor.sweep_approvals();

        let event = sub.try_recv().unwrap();
        assert_eq!(event.event_type(), "approval_decided");
        match &event.kind {
            EventKind::ApprovalDecided { decision, .. } => assert_eq!(decision, "expired"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // -- audit ordering --

    #[tokio::test]
    async fn test_audit_written_before_response() {
        let fx = fixture();
        let outcome = call(&fx, json!({"tool": "echo", "args": {}})).await;
        assert!(outcome.is_accepted());
        // By the time the outcome is visible the record is on disk.
        let records = fx.audit.read_all().unwrap();
        assert_eq!(records.last().unwrap().event, "tool_call_accepted");
    }

    #[tokio::test]
    async fn test_actor_recorded_in_audit() {
        let fx = fixture();
        let outcome = fx
            .supervisor
            .process_call(
                &json!({"tool": "echo", "args": {}}),
                "1.2.3.4",
                Some(Actor::User("alice".to_string())),
            )
            .await;
        assert!(outcome.is_accepted());
        let records = fx.audit.read_all().unwrap();
        assert_eq!(records.last().unwrap().actor.as_deref(), Some("alice"));
    }

    // -- health --

    #[tokio::test]
    async fn test_health_snapshot_surfaces_all_escape_hatch() {
        let fx = fixture_with(|config| {
            config.allowed_caps = palisade_core::AllowedCaps::All;
        });
        let health = fx.supervisor.health_snapshot();
        assert_eq!(health["capabilities_all"], true);
        assert_eq!(health["kill_switch"]["active"], false);
        assert_eq!(health["pending_approvals"], 0);
    }
}
