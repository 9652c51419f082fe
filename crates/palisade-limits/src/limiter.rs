//! The rate limiter.

use dashmap::DashMap;
use palisade_core::SharedConfig;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{RateLimitError, RateLimitResult};

/// Current window usage for a client, for admin introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    /// Requests currently inside the sliding window.
    pub requests_in_window: usize,
    /// Requests still available before the limit fires.
    pub remaining: usize,
}

#[derive(Debug)]
struct UserQuota {
    count: u32,
    reset_at: Instant,
}

/// Sliding-window per-client limiter plus per-user quota.
pub struct RateLimiter {
    config: SharedConfig,
    clients: DashMap<String, VecDeque<Instant>>,
    users: DashMap<String, UserQuota>,
}

/// Resolve the rate-limit key for a request: the leftmost `X-Forwarded-For`
/// entry when present, else the socket peer address.
#[must_use]
pub fn client_key(forwarded_for: Option<&str>, peer_ip: &str) -> String {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .unwrap_or(peer_ip)
        .to_string()
}

impl RateLimiter {
    /// Create a limiter over the live configuration.
    #[must_use]
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// Check and record one request for `client_key`.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::ClientLimitExceeded`] when the window already holds
    /// `max_requests + burst` entries.
    pub fn check_client(&self, client_key: &str) -> RateLimitResult<()> {
        self.check_client_at(client_key, Instant::now())
    }

    fn check_client_at(&self, client_key: &str, now: Instant) -> RateLimitResult<()> {
        let limits = self.config.load().rate_limits.clone();
        if !limits.enabled {
            return Ok(());
        }
        let window = Duration::from_secs(limits.client_window_seconds);
        let budget = (limits.client_max_requests + limits.client_burst) as usize;

        let mut entries = self.clients.entry(client_key.to_string()).or_default();
        prune_window(&mut entries, now, window);

        if entries.len() >= budget {
            let retry_after = entries
                .front()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            let retry_after_seconds = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            tracing::debug!(client = client_key, retry_after_seconds, "client rate limited");
            return Err(RateLimitError::ClientLimitExceeded {
                retry_after_seconds,
            });
        }

        entries.push_back(now);
        Ok(())
    }

    /// Check and record one request for `username`.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::UserLimitExceeded`] when the user's quota for the
    /// current window is spent.
    pub fn check_user(&self, username: &str) -> RateLimitResult<()> {
        self.check_user_at(username, Instant::now())
    }

    fn check_user_at(&self, username: &str, now: Instant) -> RateLimitResult<()> {
        let limits = self.config.load().rate_limits.clone();
        if !limits.enabled {
            return Ok(());
        }
        let window = Duration::from_secs(limits.user_window_seconds);

        let mut quota = self
            .users
            .entry(username.to_string())
            .or_insert_with(|| UserQuota {
                count: 0,
                reset_at: now + window,
            });

        if now >= quota.reset_at {
            quota.count = 0;
            quota.reset_at = now + window;
        }

        if quota.count >= limits.user_max_requests {
            let retry_after = quota.reset_at.saturating_duration_since(now);
            let retry_after_seconds = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            tracing::debug!(user = username, retry_after_seconds, "user rate limited");
            return Err(RateLimitError::UserLimitExceeded {
                user: username.to_string(),
                retry_after_seconds,
            });
        }

        quota.count += 1;
        Ok(())
    }

    /// Window usage snapshot for a client (prunes stale entries first).
    #[must_use]
    pub fn current_usage(&self, client_key: &str) -> WindowUsage {
        let limits = self.config.load().rate_limits.clone();
        let window = Duration::from_secs(limits.client_window_seconds);
        let budget = (limits.client_max_requests + limits.client_burst) as usize;
        let now = Instant::now();

        let in_window = self
            .clients
            .get_mut(client_key)
            .map(|mut entries| {
                prune_window(&mut entries, now, window);
                entries.len()
            })
            .unwrap_or(0);

        WindowUsage {
            requests_in_window: in_window,
            remaining: budget.saturating_sub(in_window),
        }
    }

    /// Drop all client windows and user quotas.
    pub fn reset_all(&self) {
        self.clients.clear();
        self.users.clear();
    }

    /// Drop the window for one client.
    pub fn reset_client(&self, client_key: &str) {
        self.clients.remove(client_key);
    }

    /// Drop the quota for one user.
    pub fn reset_user(&self, username: &str) {
        self.users.remove(username);
    }

    /// Drop all user quotas, leaving client windows intact.
    pub fn reset_all_users(&self) {
        self.users.clear();
    }
}

fn prune_window(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = entries.front() {
        if now.duration_since(*oldest) > window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("clients", &self.clients.len())
            .field("users", &self.users.len())
            .finish_non_exhaustive()
    }
}
