//! The auth seam.
//!
//! Token-based authentication is out of scope for the gateway core; the
//! HTTP layer resolves tokens and the core only consumes a role check.

/// Role check consumed from the external auth layer.
pub trait RoleChecker: Send + Sync {
    /// Whether `token` carries `role`.
    fn check_role(&self, token: &str, role: &str) -> bool;
}

/// Permissive checker for tests and single-user deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

impl RoleChecker for PermitAll {
    fn check_role(&self, _token: &str, _role: &str) -> bool {
        true
    }
}
