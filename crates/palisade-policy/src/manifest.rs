//! Per-tool capability manifests.
//!
//! A tool declares its required capabilities, risk level and approval policy
//! in a sidecar JSON file under the manifest directory. Tool ids use dots
//! (`file.write`); the loader maps them to path segments
//! (`<manifest_dir>/file/write.json`).

use palisade_core::RiskLevel;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Parsed capability manifest for a single tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolManifest {
    /// Tool identifier this manifest belongs to.
    #[serde(default)]
    pub tool: String,
    /// Human-facing name; falls back to the tool id when absent.
    #[serde(default)]
    pub display_name: String,
    /// Short description of what the tool does.
    #[serde(default)]
    pub description: String,
    /// Capabilities the tool cannot work without.
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    /// Capabilities the tool can use when granted but degrades without.
    #[serde(default)]
    pub optional_capabilities: BTreeSet<String>,
    /// Declared risk level; malformed values degrade to low so a broken
    /// manifest never grants privilege.
    #[serde(default, deserialize_with = "lenient_risk")]
    pub risk_level: RiskLevel,
    /// Approval override. `Some(false)` explicitly exempts even high-risk
    /// calls from the approval gate; absent means the risk score decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_approval: Option<bool>,
    /// When declared, any argument key outside this set denies the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_arg_keys: Option<BTreeSet<String>>,
}

impl ToolManifest {
    /// Load the manifest for `tool` from `manifest_dir`.
    ///
    /// Returns `None` when no manifest exists or the file is unreadable or
    /// malformed; unknown tools are risk-scored separately by the
    /// supervisor, so a missing manifest is not an error here.
    #[must_use]
    pub fn load(manifest_dir: &Path, tool: &str) -> Option<Self> {
        let path = Self::path_for(manifest_dir, tool)?;
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<Self>(&raw) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                tracing::warn!(tool, path = %path.display(), %err, "ignoring malformed manifest");
                None
            },
        }
    }

    /// Filesystem location for a tool's manifest.
    ///
    /// Rejects tool ids with path-traversal segments outright.
    #[must_use]
    pub fn path_for(manifest_dir: &Path, tool: &str) -> Option<PathBuf> {
        if tool.is_empty()
            || tool
                .split('.')
                .any(|seg| seg.is_empty() || seg == ".." || seg.contains(['/', '\\']))
        {
            return None;
        }
        let mut path = manifest_dir.to_path_buf();
        let mut segments = tool.split('.').peekable();
        while let Some(seg) = segments.next() {
            if segments.peek().is_some() {
                path.push(seg);
            } else {
                path.push(format!("{seg}.json"));
            }
        }
        Some(path)
    }
}

fn lenient_risk<'de, D>(deserializer: D) -> Result<RiskLevel, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(RiskLevel::parse_lenient(&raw))
}
