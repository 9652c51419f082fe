//! Gateway configuration.
//!
//! All runtime-tunable state lives in a single [`GatewayConfig`] value that
//! is built from the environment once, threaded through construction, and
//! shared as a [`SharedConfig`] (`Arc<ArcSwap<_>>`) so admin updates take
//! effect immediately without a restart. Components read through the shared
//! handle on every check rather than caching fields.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Environment variable: comma-separated capability allow-list, or `ALL`.
pub const ENV_ALLOWED_CAPS: &str = "AGENT_GATEWAY_ALLOWED_CAPS";
/// Environment variable: bootstrap admin password (consumed by external auth).
pub const ENV_ADMIN_PASSWORD: &str = "AGENT_GATEWAY_ADMIN_PASSWORD";
/// Environment variable: approval wait seconds.
pub const ENV_APPROVAL_TIMEOUT: &str = "INTELLI_APPROVAL_TIMEOUT";
/// Environment variable: worker pool size.
pub const ENV_POOL_SIZE: &str = "SANDBOX_POOL_SIZE";
/// Environment variable: per-call worker timeout seconds.
pub const ENV_WORKER_TIMEOUT: &str = "SANDBOX_WORKER_TIMEOUT";
/// Environment variable: 64-hex-char audit encryption key.
pub const ENV_AUDIT_KEY: &str = "INTELLI_AUDIT_ENCRYPT_KEY";
/// Environment variable: SSE keepalive cadence seconds.
pub const ENV_SSE_POLL_INTERVAL: &str = "AGENT_GATEWAY_SSE_POLL_INTERVAL";

/// The deployment's capability allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedCaps {
    /// Development escape hatch: every capability is granted.
    ///
    /// Construction logs a loud warning and health surfaces must expose it.
    All,
    /// Only the listed capability tokens are granted.
    Listed(BTreeSet<String>),
}

impl AllowedCaps {
    /// Conservative default: read-only filesystem plus DOM access.
    #[must_use]
    pub fn default_set() -> Self {
        Self::Listed(
            ["fs.read", "browser.dom"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }

    /// Parse the `AGENT_GATEWAY_ALLOWED_CAPS` value.
    ///
    /// Empty or whitespace-only input yields the conservative default; the
    /// literal `ALL` (case-insensitive) grants everything.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default_set();
        }
        if raw.eq_ignore_ascii_case("ALL") {
            return Self::All;
        }
        Self::Listed(
            raw.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// Whether a capability token is granted.
    #[must_use]
    pub fn permits(&self, cap: &str) -> bool {
        match self {
            Self::All => true,
            Self::Listed(set) => set.contains(cap),
        }
    }

    /// Whether this is the `ALL` escape hatch.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl Default for AllowedCaps {
    fn default() -> Self {
        Self::default_set()
    }
}

/// Rate limiter tunables, read on every check through [`SharedConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Globally enable/disable both limiters (tests and internal calls).
    pub enabled: bool,
    /// Per-client sliding-window request budget.
    pub client_max_requests: u32,
    /// Per-client window length in seconds.
    pub client_window_seconds: u64,
    /// Extra requests tolerated above the budget.
    pub client_burst: u32,
    /// Per-user quota per window.
    pub user_max_requests: u32,
    /// Per-user window length in seconds.
    pub user_window_seconds: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            client_max_requests: 60,
            client_window_seconds: 60,
            client_burst: 10,
            user_max_requests: 30,
            user_window_seconds: 60,
        }
    }
}

/// All gateway configuration, built once from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Deployment capability allow-list.
    pub allowed_caps: AllowedCaps,
    /// When `false`, tools without a manifest are denied outright.
    pub allow_unknown_tools: bool,
    /// Directory holding per-tool capability manifests.
    pub manifest_dir: PathBuf,
    /// How long a submitter blocks waiting for an approval decision.
    pub approval_timeout: Duration,
    /// Number of persistent worker subprocesses.
    pub pool_size: usize,
    /// Per-call worker timeout.
    pub worker_timeout: Duration,
    /// AES-256-GCM audit key; `None` means plaintext audit lines.
    pub audit_key: Option<[u8; 32]>,
    /// SSE keepalive cadence.
    pub sse_keepalive: Duration,
    /// Bootstrap admin password, handed to the external auth layer.
    pub admin_password: Option<String>,
    /// Rate limiter tunables.
    pub rate_limits: RateLimitSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allowed_caps: AllowedCaps::default_set(),
            allow_unknown_tools: true,
            manifest_dir: PathBuf::from("schemas/capabilities"),
            approval_timeout: Duration::from_secs(60),
            pool_size: 2,
            worker_timeout: Duration::from_secs(5),
            audit_key: None,
            sse_keepalive: Duration::from_secs(15),
            admin_password: None,
            rate_limits: RateLimitSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Build the configuration from recognized environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a numeric variable fails to parse or when the
    /// audit key is present but not exactly 64 hex characters.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(ENV_ALLOWED_CAPS) {
            config.allowed_caps = AllowedCaps::parse(&raw);
        }
        if config.allowed_caps.is_all() {
            tracing::warn!(
                "{ENV_ALLOWED_CAPS}=ALL grants every capability; this is a development \
                 escape hatch and must not reach production"
            );
        }

        if let Some(secs) = read_f64(ENV_APPROVAL_TIMEOUT)? {
            config.approval_timeout = Duration::from_secs_f64(secs);
        }
        if let Some(size) = read_u64(ENV_POOL_SIZE)? {
            config.pool_size = usize::try_from(size).unwrap_or(usize::MAX);
        }
        if let Some(secs) = read_f64(ENV_WORKER_TIMEOUT)? {
            config.worker_timeout = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = read_f64(ENV_SSE_POLL_INTERVAL)? {
            config.sse_keepalive = Duration::from_secs_f64(secs);
        }

        config.audit_key = parse_audit_key(
            std::env::var(ENV_AUDIT_KEY).ok().as_deref().unwrap_or(""),
        )?;
        config.admin_password = std::env::var(ENV_ADMIN_PASSWORD)
            .ok()
            .filter(|p| !p.is_empty());

        Ok(config)
    }

    /// Wrap this configuration for shared, atomically swappable access.
    #[must_use]
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(ArcSwap::from_pointee(self))
    }
}

/// Shared handle to the live configuration.
///
/// `load()` is wait-free; `store()` swaps the whole value so readers never
/// observe a half-updated configuration.
pub type SharedConfig = Arc<ArcSwap<GatewayConfig>>;

/// Parse the audit key environment value.
///
/// Empty or whitespace-only input means encryption is off.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidAuditKey`] unless the value decodes to
/// exactly 32 bytes.
pub fn parse_audit_key(raw: &str) -> ConfigResult<Option<[u8; 32]>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let bytes = hex::decode(raw).map_err(|_| ConfigError::InvalidAuditKey {
        detail: "not valid hex".to_string(),
    })?;
    let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        ConfigError::InvalidAuditKey {
            detail: format!("must be 64 hex chars (32 bytes), got {}", b.len()),
        }
    })?;
    Ok(Some(key))
}

fn read_f64(var: &str) -> ConfigResult<Option<f64>> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => {
            let value = raw
                .trim()
                .parse::<f64>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: var.to_string(),
                    value: raw,
                })?;
            Ok(Some(value))
        },
        _ => Ok(None),
    }
}

fn read_u64(var: &str) -> ConfigResult<Option<u64>> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => {
            let value = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: var.to_string(),
                    value: raw,
                })?;
            Ok(Some(value))
        },
        _ => Ok(None),
    }
}
