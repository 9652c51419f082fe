//! Outbound webhook delivery.
//!
//! Registered endpoints receive a POST for every event type in their
//! subscription set, signed with `X-Webhook-Signature: sha256=<hex>` over
//! the exact request body. Delivery runs off-task with bounded retries and
//! never blocks or fails the publisher.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::error::{EventError, EventResult};
use crate::event::GatewayEvent;

/// Signature header name.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Per-attempt delivery timeout.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep between attempts; three attempts total.
const DELIVERY_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(4),
    Duration::from_secs(16),
];

/// Failures kept per endpoint.
const DELIVERY_LOG_CAP: usize = 100;

type HmacSha256 = Hmac<Sha256>;

/// A registered webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    /// Short unique id.
    pub id: String,
    /// Destination URL.
    pub url: String,
    /// Event types this endpoint wants.
    pub events: BTreeSet<String>,
    /// HMAC signing secret.
    pub secret: String,
}

/// One failed delivery, kept in the bounded per-endpoint log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailure {
    /// When the final attempt failed.
    pub ts: DateTime<Utc>,
    /// The event type that could not be delivered.
    pub event_type: String,
    /// Error from the last attempt.
    pub error: String,
    /// How many attempts were made.
    pub attempts: u32,
}

/// Compute the signature header value for a payload.
#[must_use]
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header in constant time.
#[must_use]
pub fn verify_signature(body: &[u8], header: &str, secret: &str) -> bool {
    let expected = sign_body(secret, body);
    expected.as_bytes().ct_eq(header.as_bytes()).into()
}

/// Endpoint registry plus delivery machinery.
pub struct WebhookRegistry {
    path: Option<PathBuf>,
    hooks: DashMap<String, WebhookEndpoint>,
    delivery_log: Arc<DashMap<String, VecDeque<DeliveryFailure>>>,
    client: reqwest::Client,
    backoff: Vec<Duration>,
}

impl WebhookRegistry {
    /// In-memory registry (no persistence).
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: None,
            hooks: DashMap::new(),
            delivery_log: Arc::new(DashMap::new()),
            client: reqwest::Client::new(),
            backoff: DELIVERY_BACKOFF.to_vec(),
        }
    }

    /// Registry persisted to a JSON file; loads existing endpoints.
    pub fn open(path: impl AsRef<Path>) -> EventResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut registry = Self::new();

        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let hooks: HashMap<String, WebhookEndpoint> = serde_json::from_str(&raw)?;
            for (id, hook) in hooks {
                registry.hooks.insert(id, hook);
            }
        }
        registry.path = Some(path);
        Ok(registry)
    }

    /// Shrink retry backoff (tests).
    #[cfg(test)]
    fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Register a new endpoint.
    pub fn register(
        &self,
        url: impl Into<String>,
        events: BTreeSet<String>,
        secret: impl Into<String>,
    ) -> EventResult<WebhookEndpoint> {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let hook = WebhookEndpoint {
            id: id.clone(),
            url: url.into(),
            events,
            secret: secret.into(),
        };
        self.hooks.insert(id, hook.clone());
        self.save()?;
        tracing::info!(id = %hook.id, url = %hook.url, "webhook registered");
        Ok(hook)
    }

    /// All registered endpoints.
    #[must_use]
    pub fn list(&self) -> Vec<WebhookEndpoint> {
        let mut hooks: Vec<WebhookEndpoint> =
            self.hooks.iter().map(|entry| entry.value().clone()).collect();
        hooks.sort_by(|a, b| a.id.cmp(&b.id));
        hooks
    }

    /// Look up one endpoint.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<WebhookEndpoint> {
        self.hooks.get(id).map(|entry| entry.value().clone())
    }

    /// Remove an endpoint.
    pub fn delete(&self, id: &str) -> EventResult<()> {
        self.hooks
            .remove(id)
            .ok_or_else(|| EventError::NotFound { id: id.to_string() })?;
        self.delivery_log.remove(id);
        self.save()
    }

    /// Recent delivery failures for an endpoint, oldest first.
    #[must_use]
    pub fn delivery_failures(&self, id: &str) -> Vec<DeliveryFailure> {
        self.delivery_log
            .get(id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver an event to every subscribed endpoint.
    ///
    /// Fire-and-forget: each delivery (with its retries) runs on its own
    /// task and the caller returns immediately. Returns the number of
    /// deliveries started.
    pub fn fire(&self, event: &GatewayEvent) -> usize {
        let event_type = event.event_type();
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(%err, "failed to serialize webhook payload");
                return 0;
            },
        };

        let mut started = 0usize;
        for entry in self.hooks.iter() {
            if !entry.events.contains(event_type) {
                continue;
            }
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                tracing::warn!(event_type, "no async runtime; webhook delivery skipped");
                return started;
            };
            let hook = entry.value().clone();
            let task = DeliveryTask {
                client: self.client.clone(),
                hook,
                event_type: event_type.to_string(),
                body: body.clone(),
                backoff: self.backoff.clone(),
                delivery_log: Arc::clone(&self.delivery_log),
            };
            handle.spawn(task.run());
            started += 1;
        }
        started
    }

    fn save(&self) -> EventResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot: HashMap<String, WebhookEndpoint> = self
            .hooks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(())
    }
}

impl Default for WebhookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WebhookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookRegistry")
            .field("hooks", &self.hooks.len())
            .field("persisted", &self.path.is_some())
            .finish_non_exhaustive()
    }
}

struct DeliveryTask {
    client: reqwest::Client,
    hook: WebhookEndpoint,
    event_type: String,
    body: Vec<u8>,
    backoff: Vec<Duration>,
    delivery_log: Arc<DashMap<String, VecDeque<DeliveryFailure>>>,
}

impl DeliveryTask {
    async fn run(self) {
        let signature = sign_body(&self.hook.secret, &self.body);
        let attempts = u32::try_from(self.backoff.len()).unwrap_or(u32::MAX);
        let mut last_error = String::new();

        for attempt in 0..self.backoff.len() {
            match self.attempt(&signature).await {
                Ok(()) => {
                    tracing::debug!(
                        hook = %self.hook.id,
                        event = %self.event_type,
                        attempt = attempt + 1,
                        "webhook delivered"
                    );
                    return;
                },
                Err(err) => {
                    last_error = err;
                    tracing::warn!(
                        hook = %self.hook.id,
                        event = %self.event_type,
                        attempt = attempt + 1,
                        error = %last_error,
                        "webhook delivery attempt failed"
                    );
                    // No sleep after the final attempt.
                    if attempt + 1 < self.backoff.len() {
                        tokio::time::sleep(self.backoff[attempt]).await;
                    }
                },
            }
        }

        self.record_failure(attempts, last_error);
    }

    async fn attempt(&self, signature: &str) -> Result<(), String> {
        let response = self
            .client
            .post(&self.hook.url)
            .timeout(DELIVERY_TIMEOUT)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(self.body.clone())
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("status {}", response.status().as_u16()))
        }
    }

    fn record_failure(&self, attempts: u32, error: String) {
        let mut log = self.delivery_log.entry(self.hook.id.clone()).or_default();
        if log.len() >= DELIVERY_LOG_CAP {
            log.pop_front();
        }
        log.push_back(DeliveryFailure {
            ts: Utc::now(),
            event_type: self.event_type.clone(),
            error,
            attempts,
        });
    }
}
