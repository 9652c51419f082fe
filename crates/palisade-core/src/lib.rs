//! Palisade Core - Foundation types for the Palisade agent gateway.
//!
//! This crate provides:
//! - The tool-call vocabulary shared by every gateway component
//! - `GatewayConfig`: environment-driven configuration with atomic runtime swap
//! - The kill-switch global halt gate
//! - The `RoleChecker` seam consumed from the (external) auth layer

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod auth;
pub mod config;
pub mod error;
pub mod kill_switch;
pub mod prelude;
pub mod types;

pub use auth::{PermitAll, RoleChecker};
pub use config::{AllowedCaps, GatewayConfig, RateLimitSettings, SharedConfig};
pub use error::{ConfigError, ConfigResult};
pub use kill_switch::{KillSwitch, KillSwitchStatus};
pub use types::{Actor, RiskLevel, ToolArgs, ToolCall};
