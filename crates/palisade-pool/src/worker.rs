//! A single persistent worker subprocess.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::{PoolError, PoolResult};
use crate::protocol::{WorkerRequest, WorkerResponse, MAX_REQUEST_BYTES};

/// Restart backoff cap in seconds.
const MAX_BACKOFF_SECS: u64 = 30;

pub(crate) struct WorkerProcess {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    fail_count: u32,
}

impl WorkerProcess {
    pub(crate) fn spawn(program: &str, args: &[String]) -> PoolResult<Self> {
        let mut worker = Self {
            program: program.to_string(),
            args: args.to_vec(),
            child: None,
            stdin: None,
            stdout: None,
            fail_count: 0,
        };
        worker.spawn_child()?;
        Ok(worker)
    }

    fn spawn_child(&mut self) -> PoolResult<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take().map(BufReader::new);
        tracing::debug!(program = %self.program, pid = child.id(), "worker spawned");
        self.child = Some(child);
        Ok(())
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub(crate) fn fail_count(&self) -> u32 {
        self.fail_count
    }

    /// Whether the subprocess is still running.
    pub(crate) fn alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Kill and respawn after an exponential backoff.
    ///
    /// `fail_count` is never reset on success; operators recover a flapping
    /// worker by recreating the pool.
    pub(crate) async fn restart(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        self.stdin = None;
        self.stdout = None;

        self.fail_count = self.fail_count.saturating_add(1);
        let backoff_secs = 1u64
            .checked_shl(self.fail_count.min(16))
            .unwrap_or(u64::MAX)
            .min(MAX_BACKOFF_SECS);
        tracing::warn!(
            program = %self.program,
            fail_count = self.fail_count,
            backoff_secs,
            "restarting worker"
        );
        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;

        if let Err(err) = self.spawn_child() {
            tracing::warn!(program = %self.program, %err, "worker respawn failed");
        }
    }

    /// Send one request and read one response line, restarting the worker
    /// on every failure: write failure, read timeout, empty or malformed
    /// response, id mismatch, and explicit error responses alike.
    pub(crate) async fn call(
        &mut self,
        action: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> PoolResult<serde_json::Value> {
        if !self.alive() {
            self.restart().await;
        }

        let request = WorkerRequest::new(action, params);
        let mut line = serde_json::to_string(&request)
            .map_err(|err| PoolError::MalformedResponse(err.to_string()))?;
        if line.len() > MAX_REQUEST_BYTES {
            return Err(PoolError::RequestTooLarge { size: line.len() });
        }
        line.push('\n');

        // Write the request.
        let write_result = match self.stdin.as_mut() {
            Some(stdin) => {
                let write = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.flush().await
                };
                write.await.map_err(|err| err.to_string())
            },
            None => Err("stdin closed".to_string()),
        };
        if let Err(err) = write_result {
            self.restart().await;
            return Err(PoolError::WriteFailed(err));
        }

        // Read the response line under the caller's timeout. The timeout is
        // enforced at the byte level: a worker writing a partial line keeps
        // the read pending and trips it.
        let Some(stdout) = self.stdout.as_mut() else {
            self.restart().await;
            return Err(PoolError::ReadFailed("stdout closed".to_string()));
        };
        let mut response_line = String::new();
        match tokio::time::timeout(timeout, stdout.read_line(&mut response_line)).await {
            Err(_elapsed) => {
                self.restart().await;
                return Err(PoolError::Timeout);
            },
            Ok(Err(err)) => {
                let err = err.to_string();
                self.restart().await;
                return Err(PoolError::ReadFailed(err));
            },
            Ok(Ok(0)) => {
                self.restart().await;
                return Err(PoolError::EmptyResponse);
            },
            Ok(Ok(_)) => {},
        }
        if response_line.trim().is_empty() {
            self.restart().await;
            return Err(PoolError::EmptyResponse);
        }

        let response: WorkerResponse = match serde_json::from_str(response_line.trim()) {
            Ok(response) => response,
            Err(err) => {
                self.restart().await;
                return Err(PoolError::MalformedResponse(err.to_string()));
            },
        };

        if response.id.as_deref() != Some(request.id.as_str()) {
            self.restart().await;
            return Err(PoolError::IdMismatch);
        }
        if let Some(message) = response.error {
            self.restart().await;
            return Err(PoolError::WorkerError(message));
        }
        match response.result {
            Some(result) => Ok(result),
            // No result key: hand back the raw line as an opaque payload.
            None => serde_json::from_str(response_line.trim())
                .map_err(|err| PoolError::MalformedResponse(err.to_string())),
        }
    }

    pub(crate) fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        self.stdin = None;
        self.stdout = None;
    }
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("program", &self.program)
            .field("pid", &self.pid())
            .field("fail_count", &self.fail_count)
            .finish_non_exhaustive()
    }
}
