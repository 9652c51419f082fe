//! Sandbox worker subprocess.
//!
//! Speaks the pool's newline-delimited JSON protocol over stdin/stdout.
//! Two modes:
//!
//! - persistent (default): loop over request lines until stdin closes,
//!   letting the pool reuse the process across calls;
//! - `--one-shot`: read all of stdin as a single request, write one
//!   response, and report the outcome through the exit code.
//!
//! Exit codes (one-shot mode): 0 ok, 1 handler failure, 2 no input,
//! 3 action not allowed, 4 input too large.
//!
//! The process isolates tool actions from the gateway; a production
//! deployment adds OS-level sandboxing around it.

use clap::Parser;
use palisade_pool::{WorkerRequest, WorkerResponse, MAX_REQUEST_BYTES};
use std::io::{BufRead, Read, Write};
use std::process::ExitCode;

mod shell;

#[derive(Debug, Parser)]
#[command(name = "palisade-worker", about = "Palisade sandbox worker")]
struct Args {
    /// Read a single request from stdin, answer, and exit.
    #[arg(long)]
    one_shot: bool,

    /// Permit the `shell` action for this deployment.
    #[arg(long, env = "PALISADE_WORKER_ALLOW_SHELL")]
    allow_shell: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.one_shot {
        run_one_shot(args.allow_shell)
    } else {
        run_persistent(args.allow_shell)
    }
}

fn run_persistent(allow_shell: bool) -> ExitCode {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.len() > MAX_REQUEST_BYTES {
            respond(&WorkerResponse::err(None, "input too large"));
            continue;
        }
        let response = match serde_json::from_str::<WorkerRequest>(line) {
            Ok(request) => handle_request(&request, allow_shell),
            Err(err) => WorkerResponse::err(None, err.to_string()),
        };
        respond(&response);
    }
    ExitCode::SUCCESS
}

fn run_one_shot(allow_shell: bool) -> ExitCode {
    let mut raw = String::new();
    if std::io::stdin().read_to_string(&mut raw).is_err() || raw.trim().is_empty() {
        respond(&WorkerResponse::err(None, "no input"));
        return ExitCode::from(2);
    }
    if raw.len() > MAX_REQUEST_BYTES {
        respond(&WorkerResponse::err(None, "input too large"));
        return ExitCode::from(4);
    }

    let request = match serde_json::from_str::<WorkerRequest>(raw.trim()) {
        Ok(request) => request,
        Err(err) => {
            respond(&WorkerResponse::err(None, err.to_string()));
            return ExitCode::from(1);
        },
    };

    if !action_allowed(&request.action, allow_shell) {
        respond(&WorkerResponse::err(
            Some(request.id),
            format!("action not allowed: {}", request.action),
        ));
        return ExitCode::from(3);
    }

    respond(&handle_request(&request, allow_shell));
    ExitCode::SUCCESS
}

fn action_allowed(action: &str, allow_shell: bool) -> bool {
    matches!(action, "noop" | "echo") || (action == "shell" && allow_shell)
}

fn handle_request(request: &WorkerRequest, allow_shell: bool) -> WorkerResponse {
    if !action_allowed(&request.action, allow_shell) {
        return WorkerResponse::err(
            Some(request.id.clone()),
            format!("action not allowed: {}", request.action),
        );
    }
    let result = match request.action.as_str() {
        "noop" => handle_noop(),
        "echo" => handle_echo(&request.params),
        "shell" => shell::handle_shell(&request.params),
        // Unreachable behind action_allowed; kept for wire parity.
        other => return WorkerResponse::err(
            Some(request.id.clone()),
            format!("action not allowed: {other}"),
        ),
    };
    WorkerResponse::ok(request.id.clone(), result)
}

fn handle_noop() -> serde_json::Value {
    serde_json::json!({"status": "ok", "message": "noop"})
}

fn handle_echo(params: &serde_json::Value) -> serde_json::Value {
    let echo = if params.is_object() {
        params.clone()
    } else {
        serde_json::json!({})
    };
    serde_json::json!({"status": "ok", "echo": echo})
}

fn respond(response: &WorkerResponse) {
    let line = serde_json::to_string(response)
        .unwrap_or_else(|_| r#"{"error":"worker failure"}"#.to_string());
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.flush();
}
