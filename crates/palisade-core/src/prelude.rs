//! Convenience re-exports for downstream crates.

pub use crate::auth::RoleChecker;
pub use crate::config::{AllowedCaps, GatewayConfig, RateLimitSettings, SharedConfig};
pub use crate::error::{ConfigError, ConfigResult};
pub use crate::kill_switch::{KillSwitch, KillSwitchStatus};
pub use crate::types::{Actor, RiskLevel, ToolArgs, ToolCall};
