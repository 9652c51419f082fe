//! Heuristic risk scoring.
//!
//! A second line of defense independent of the manifest: suspicious
//! arguments override a tool's declared low risk. Every triggered rule
//! contributes its severity and the highest wins.

use palisade_core::{RiskLevel, ToolArgs};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::manifest::ToolManifest;

/// Arg string values longer than this raise the score to at least medium.
const LARGE_VALUE_CHARS: usize = 500;

static HIGH_RISK_TOOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(system\.exec|file\.write|file\.delete|network\.request)$")
        .expect("high-risk tool pattern is valid")
});

static MEDIUM_RISK_TOOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(file\.read|clipboard\.read)$").expect("medium-risk tool pattern is valid")
});

static SQL_INJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)'\s*;.*\b(drop|delete|update|insert)\b")
        .expect("sql-injection pattern is valid")
});

static SUSPICIOUS_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(command|cmd|exec|shell|eval)\b").expect("suspicious-key pattern is valid")
});

/// Classify a call from tool identity plus argument heuristics.
///
/// The manifest's declared `risk_level` (when present) is the floor; the
/// heuristics only ever raise the result.
#[must_use]
pub fn compute_risk(tool: &str, args: &ToolArgs, manifest: Option<&ToolManifest>) -> RiskLevel {
    let mut risk = manifest.map(|m| m.risk_level).unwrap_or_default();

    if HIGH_RISK_TOOL.is_match(tool) {
        risk = risk.max(RiskLevel::High);
    } else if MEDIUM_RISK_TOOL.is_match(tool) {
        risk = risk.max(RiskLevel::Medium);
    }

    for (key, value) in args {
        if SUSPICIOUS_KEY.is_match(key) {
            risk = risk.max(RiskLevel::Medium);
        }
        if let Value::String(s) = value {
            if s.contains("../") || s.starts_with("/proc/") {
                risk = risk.max(RiskLevel::High);
            }
            if SQL_INJECTION.is_match(s) {
                risk = risk.max(RiskLevel::High);
            }
            if s.chars().count() > LARGE_VALUE_CHARS {
                risk = risk.max(RiskLevel::Medium);
            }
        }
    }

    risk
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args_of(value: serde_json::Value) -> ToolArgs {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn risk_of(tool: &str, args: serde_json::Value) -> RiskLevel {
        compute_risk(tool, &args_of(args), None)
    }

    #[test]
    fn test_safe_tool_no_suspicious_args_is_low() {
        assert_eq!(risk_of("echo", json!({"text": "hello"})), RiskLevel::Low);
        assert_eq!(risk_of("noop", json!({})), RiskLevel::Low);
    }

    #[test]
    fn test_high_risk_tools_always_high() {
        for tool in ["system.exec", "file.write", "file.delete", "network.request"] {
            assert_eq!(risk_of(tool, json!({})), RiskLevel::High, "tool {tool}");
        }
    }

    #[test]
    fn test_medium_risk_tools() {
        assert_eq!(risk_of("file.read", json!({})), RiskLevel::Medium);
        assert_eq!(risk_of("clipboard.read", json!({})), RiskLevel::Medium);
    }

    #[test]
    fn test_tool_match_is_exact_not_prefix() {
        assert_eq!(risk_of("file.write2", json!({})), RiskLevel::Low);
        assert_eq!(risk_of("my.system.exec", json!({})), RiskLevel::Low);
    }

    #[test]
    fn test_path_traversal_raises_to_high() {
        assert_eq!(
            risk_of("echo", json!({"path": "../../etc/passwd"})),
            RiskLevel::High
        );
    }

    #[test]
    fn test_proc_path_raises_to_high() {
        assert_eq!(
            risk_of("echo", json!({"src": "/proc/self/mem"})),
            RiskLevel::High
        );
    }

    #[test]
    fn test_sql_injection_raises_to_high() {
        assert_eq!(
            risk_of("echo", json!({"q": "'; DROP TABLE users; --"})),
            RiskLevel::High
        );
        assert_eq!(
            risk_of("echo", json!({"q": "' ; delete from t"})),
            RiskLevel::High
        );
    }

    #[test]
    fn test_plain_quote_is_not_injection() {
        assert_eq!(
            risk_of("echo", json!({"q": "it's a nice day"})),
            RiskLevel::Low
        );
    }

    #[test]
    fn test_suspicious_key_raises_to_medium() {
        assert_eq!(risk_of("echo", json!({"command": "ls"})), RiskLevel::Medium);
        assert_eq!(risk_of("echo", json!({"shell_cmd": "ls"})), RiskLevel::Medium);
    }

    #[test]
    fn test_large_value_raises_to_medium() {
        assert_eq!(
            risk_of("echo", json!({"data": "x".repeat(600)})),
            RiskLevel::Medium
        );
    }

    #[test]
    fn test_combined_medium_rules_stay_medium() {
        // Suspicious key and oversized value both trigger; the join of two
        // mediums is still medium.
        assert_eq!(
            risk_of("echo", json!({"cmd": "y".repeat(600)})),
            RiskLevel::Medium
        );
    }

    #[test]
    fn test_heuristics_override_declared_low_risk() {
        let manifest: ToolManifest = serde_json::from_value(json!({
            "tool": "echo",
            "risk_level": "low"
        }))
        .unwrap();
        let args = args_of(json!({"path": "../../secret"}));
        assert_eq!(
            compute_risk("echo", &args, Some(&manifest)),
            RiskLevel::High
        );
    }

    #[test]
    fn test_manifest_risk_is_the_floor() {
        let manifest: ToolManifest = serde_json::from_value(json!({
            "tool": "pdf.read",
            "risk_level": "medium"
        }))
        .unwrap();
        assert_eq!(
            compute_risk("pdf.read", &ToolArgs::new(), Some(&manifest)),
            RiskLevel::Medium
        );
    }

    #[test]
    fn test_non_string_values_ignored_by_value_rules() {
        assert_eq!(
            risk_of("echo", json!({"count": 9000, "nested": {"path": "../x"}})),
            RiskLevel::Low
        );
    }
}
