//! The `shell` action.
//!
//! Runs a command through the system shell with hard limits enforced on
//! this side of the pipe so a compromised gateway cannot cheat them:
//! the timeout is capped at 120 s and combined output is truncated.

use serde_json::{json, Value};
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Hard cap on the requested timeout.
const MAX_TIMEOUT_SECS: u64 = 120;
/// Default timeout when the request does not specify one.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default cap on combined stdout+stderr length.
const DEFAULT_MAX_OUTPUT: usize = 8000;
/// Poll interval while waiting for the child.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Execute `params.cmd` and return `{exit_code, output}` or `{error}`.
pub(crate) fn handle_shell(params: &Value) -> Value {
    let Some(cmd) = params.get("cmd").and_then(Value::as_str).filter(|c| !c.is_empty()) else {
        return json!({"error": "cmd is required"});
    };
    let timeout_secs = params
        .get("timeout")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
        .min(MAX_TIMEOUT_SECS);
    let max_output = params
        .get("max_output")
        .and_then(Value::as_u64)
        .map_or(DEFAULT_MAX_OUTPUT, |n| usize::try_from(n).unwrap_or(usize::MAX));

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = params.get("cwd").and_then(Value::as_str) {
        command.current_dir(cwd);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => return json!({"error": err.to_string()}),
    };

    // Drain the pipes off-thread so a chatty command cannot deadlock on a
    // full pipe buffer while we poll for exit.
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return json!({"error": format!("Command timed out after {timeout_secs}s")});
                }
                std::thread::sleep(POLL_INTERVAL);
            },
            Err(err) => return json!({"error": err.to_string()}),
        }
    };

    let stdout = stdout_reader.map(join_reader).unwrap_or_default();
    let stderr = stderr_reader.map(join_reader).unwrap_or_default();

    let mut combined = stdout;
    if !stderr.trim().is_empty() {
        combined.push_str("\n[stderr]\n");
        combined.push_str(&stderr);
    }
    let total = combined.chars().count();
    if total > max_output {
        let truncated: String = combined.chars().take(max_output).collect();
        combined = format!("{truncated}\n… (truncated, {total} chars total)");
    }

    json!({
        "exit_code": status.code().unwrap_or(-1),
        "output": combined,
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buffer = String::new();
        let _ = source.read_to_string(&mut buffer);
        buffer
    })
}

fn join_reader(handle: std::thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_cmd_is_an_error() {
        let result = handle_shell(&json!({}));
        assert_eq!(result["error"], "cmd is required");
    }

    #[test]
    fn test_captures_stdout_and_exit_code() {
        let result = handle_shell(&json!({"cmd": "echo hello"}));
        assert_eq!(result["exit_code"], 0);
        assert!(result["output"].as_str().unwrap().contains("hello"));
    }

    #[test]
    fn test_nonzero_exit_code_reported() {
        let result = handle_shell(&json!({"cmd": "exit 7"}));
        assert_eq!(result["exit_code"], 7);
    }

    #[test]
    fn test_stderr_is_labelled() {
        let result = handle_shell(&json!({"cmd": "echo oops >&2"}));
        let output = result["output"].as_str().unwrap();
        assert!(output.contains("[stderr]"));
        assert!(output.contains("oops"));
    }

    #[test]
    fn test_output_truncated() {
        let result = handle_shell(&json!({
            "cmd": "yes x | head -c 20000",
            "max_output": 100
        }));
        let output = result["output"].as_str().unwrap();
        assert!(output.contains("truncated"));
        assert!(output.len() < 300);
    }

    #[test]
    fn test_timeout_kills_the_command() {
        let started = Instant::now();
        let result = handle_shell(&json!({"cmd": "sleep 30", "timeout": 1}));
        assert!(result["error"].as_str().unwrap().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_requested_timeout_is_capped() {
        // A 10-minute request is clamped to the 120 s hard cap; the command
        // itself finishes instantly so we only check it ran.
        let result = handle_shell(&json!({"cmd": "true", "timeout": 600}));
        assert_eq!(result["exit_code"], 0);
    }

    #[test]
    fn test_cwd_is_honored() {
        let dir = std::env::temp_dir();
        let result = handle_shell(&json!({"cmd": "pwd", "cwd": dir.to_str().unwrap()}));
        assert_eq!(result["exit_code"], 0);
    }
}
