//! Capability verification against the deployment allow-list.

use palisade_core::{SharedConfig, ToolArgs};

use crate::manifest::ToolManifest;

/// The closed set of capability tokens a manifest may declare.
pub const KNOWN_CAPABILITIES: &[&str] = &[
    "fs.read",
    "fs.write",
    "fs.delete",
    "fs.list",
    "net.http",
    "net.socket",
    "sys.exec",
    "sys.env",
    "clipboard.read",
    "clipboard.write",
    "browser.dom",
    "browser.nav",
    "browser.cookies",
];

/// Outcome of a capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityCheck {
    /// Whether the call may proceed past this stage.
    pub allowed: bool,
    /// Denied capability tokens, plus an `arg_keys_not_allowed:<csv>`
    /// marker when the manifest's key whitelist was violated.
    pub denied: Vec<String>,
}

impl CapabilityCheck {
    fn permit() -> Self {
        Self {
            allowed: true,
            denied: Vec::new(),
        }
    }

    fn deny(denied: Vec<String>) -> Self {
        Self {
            allowed: false,
            denied,
        }
    }
}

/// Checks tool calls against the deployment's allowed-capability policy.
///
/// Reads the allow-list through [`SharedConfig`] on every check so admin
/// updates apply without reconstruction.
#[derive(Debug, Clone)]
pub struct CapabilityVerifier {
    config: SharedConfig,
}

impl CapabilityVerifier {
    /// Create a verifier over the live configuration.
    ///
    /// The `ALL` escape hatch is logged loudly here so it shows up once at
    /// startup in addition to the config loader's own warning.
    #[must_use]
    pub fn new(config: SharedConfig) -> Self {
        if config.load().allowed_caps.is_all() {
            tracing::warn!("capability verifier running with ALL capabilities granted");
        }
        Self { config }
    }

    /// Check a call against the manifest for `tool`.
    ///
    /// A missing manifest permits the call at this stage (risk scoring is
    /// the second line of defense) unless the deployment sets
    /// `allow_unknown_tools = false`, in which case it denies with a
    /// `manifest_required` marker.
    #[must_use]
    pub fn check(&self, tool: &str, args: &ToolArgs) -> CapabilityCheck {
        let config = self.config.load();
        let Some(manifest) = ToolManifest::load(&config.manifest_dir, tool) else {
            if config.allow_unknown_tools {
                return CapabilityCheck::permit();
            }
            return CapabilityCheck::deny(vec!["manifest_required".to_string()]);
        };
        self.check_manifest(&manifest, args)
    }

    /// Check a call against an already-loaded manifest.
    #[must_use]
    pub fn check_manifest(&self, manifest: &ToolManifest, args: &ToolArgs) -> CapabilityCheck {
        let config = self.config.load();
        let caps = &config.allowed_caps;

        let mut denied: Vec<String> = manifest
            .required_capabilities
            .iter()
            .filter(|cap| !caps.permits(cap))
            .cloned()
            .collect();

        // Arg-key whitelist is skipped entirely under the ALL escape hatch.
        if !caps.is_all() {
            if let Some(allowed_keys) = &manifest.allowed_arg_keys {
                let mut extra: Vec<&str> = args
                    .keys()
                    .map(String::as_str)
                    .filter(|key| !allowed_keys.contains(*key))
                    .collect();
                if !extra.is_empty() {
                    extra.sort_unstable();
                    denied.push(format!("arg_keys_not_allowed:{}", extra.join(",")));
                }
            }
        }

        if denied.is_empty() {
            CapabilityCheck::permit()
        } else {
            tracing::debug!(tool = %manifest.tool, ?denied, "capability check failed");
            CapabilityCheck::deny(denied)
        }
    }

    /// Load the manifest for a tool, if one exists.
    #[must_use]
    pub fn manifest_for(&self, tool: &str) -> Option<ToolManifest> {
        let config = self.config.load();
        ToolManifest::load(&config.manifest_dir, tool)
    }

    /// Validate a manifest's declared capabilities against the closed token
    /// set, returning the unknown ones.
    #[must_use]
    pub fn unknown_tokens(manifest: &ToolManifest) -> Vec<String> {
        manifest
            .required_capabilities
            .iter()
            .chain(manifest.optional_capabilities.iter())
            .filter(|cap| !KNOWN_CAPABILITIES.contains(&cap.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::{AllowedCaps, GatewayConfig};
    use serde_json::json;
    use std::path::{Path, PathBuf};

    fn args_of(value: serde_json::Value) -> ToolArgs {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn config_with(dir: PathBuf, caps: AllowedCaps) -> SharedConfig {
        let mut config = GatewayConfig::default();
        config.manifest_dir = dir;
        config.allowed_caps = caps;
        config.into_shared()
    }

    fn write_manifest(dir: &Path, tool: &str, body: &str) {
        let path = ToolManifest::path_for(dir, tool).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn test_unknown_tool_permitted_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = CapabilityVerifier::new(config_with(
            dir.path().to_path_buf(),
            AllowedCaps::default_set(),
        ));

        let check = verifier.check("custom.nomanifest", &ToolArgs::new());
        assert!(check.allowed);
        assert!(check.denied.is_empty());
    }

    #[test]
    fn test_unknown_tool_denied_in_strict_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.manifest_dir = dir.path().to_path_buf();
        config.allow_unknown_tools = false;
        let verifier = CapabilityVerifier::new(config.into_shared());

        let check = verifier.check("custom.nomanifest", &ToolArgs::new());
        assert!(!check.allowed);
        assert_eq!(check.denied, vec!["manifest_required".to_string()]);
    }

    #[test]
    fn test_required_cap_outside_allow_list_denied() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "file.write",
            r#"{"tool": "file.write", "required_capabilities": ["fs.write"]}"#,
        );
        let verifier = CapabilityVerifier::new(config_with(
            dir.path().to_path_buf(),
            AllowedCaps::default_set(),
        ));

        let check = verifier.check("file.write", &ToolArgs::new());
        assert!(!check.allowed);
        assert_eq!(check.denied, vec!["fs.write".to_string()]);
    }

    #[test]
    fn test_granted_caps_pass() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "file.read",
            r#"{"tool": "file.read", "required_capabilities": ["fs.read"]}"#,
        );
        let verifier = CapabilityVerifier::new(config_with(
            dir.path().to_path_buf(),
            AllowedCaps::default_set(),
        ));

        assert!(verifier.check("file.read", &ToolArgs::new()).allowed);
    }

    #[test]
    fn test_arg_key_whitelist_violation() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "file.read",
            r#"{
                "tool": "file.read",
                "required_capabilities": ["fs.read"],
                "allowed_arg_keys": ["path"]
            }"#,
        );
        let verifier = CapabilityVerifier::new(config_with(
            dir.path().to_path_buf(),
            AllowedCaps::default_set(),
        ));

        let args = args_of(json!({"path": "/tmp/a", "mode": "w", "extra": 1}));
        let check = verifier.check("file.read", &args);
        assert!(!check.allowed);
        assert_eq!(
            check.denied,
            vec!["arg_keys_not_allowed:extra,mode".to_string()]
        );
    }

    #[test]
    fn test_all_escape_hatch_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "system.exec",
            r#"{
                "tool": "system.exec",
                "required_capabilities": ["sys.exec"],
                "allowed_arg_keys": ["cmd"]
            }"#,
        );
        let verifier =
            CapabilityVerifier::new(config_with(dir.path().to_path_buf(), AllowedCaps::All));

        let args = args_of(json!({"cmd": "ls", "anything": "goes"}));
        assert!(verifier.check("system.exec", &args).allowed);
    }

    #[test]
    fn test_allow_list_swap_applies_immediately() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "file.write",
            r#"{"tool": "file.write", "required_capabilities": ["fs.write"]}"#,
        );
        let shared = config_with(dir.path().to_path_buf(), AllowedCaps::default_set());
        let verifier = CapabilityVerifier::new(shared.clone());
        assert!(!verifier.check("file.write", &ToolArgs::new()).allowed);

        let mut widened = GatewayConfig::default();
        widened.manifest_dir = dir.path().to_path_buf();
        widened.allowed_caps = AllowedCaps::parse("fs.read,fs.write");
        shared.store(std::sync::Arc::new(widened));

        assert!(verifier.check("file.write", &ToolArgs::new()).allowed);
    }

    #[test]
    fn test_unknown_tokens_flagged() {
        let manifest: ToolManifest = serde_json::from_value(json!({
            "tool": "odd",
            "required_capabilities": ["fs.read", "quantum.entangle"]
        }))
        .unwrap();
        assert_eq!(
            CapabilityVerifier::unknown_tokens(&manifest),
            vec!["quantum.entangle".to_string()]
        );
    }
}
