//! Out-of-process hook invocation.
//!
//! The command contract: event payload as JSON on stdin, at most one JSON
//! object on stdout, exit code 0 = allow, 2 = block with stderr as the
//! reason, anything else = error. The child gets a hard timeout and is
//! killed on broken pipe; neither outcome reaches the pipeline as a crash.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{HookError, HookEvent};

/// Result of one subprocess hook invocation.
#[derive(Debug)]
pub enum SubprocessOutcome {
    /// Exit 0; carries the parsed stdout object when one was printed.
    Allowed(Option<Map<String, Value>>),
    /// Exit 2; the stderr text is the block reason.
    Blocked(String),
}

/// A file-based hook executed as a child process.
#[derive(Debug, Clone)]
pub struct SubprocessHook {
    path: PathBuf,
}

impl SubprocessHook {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Executable files run directly; plain `.py` files run through the
    /// interpreter so a repository's existing hook set keeps working.
    fn command(&self) -> Command {
        if is_executable(&self.path) {
            Command::new(&self.path)
        } else {
            let mut cmd = Command::new("python3");
            cmd.arg(&self.path);
            cmd
        }
    }

    /// Runs the hook with `payload` on stdin, bounded by `timeout`.
    pub async fn invoke(
        &self,
        event: HookEvent,
        payload: &Value,
        timeout: Duration,
    ) -> Result<SubprocessOutcome, HookError> {
        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(HookError::Io)?;

        if let Some(mut stdin) = child.stdin.take() {
            let bytes = serde_json::to_vec(payload).unwrap_or_default();
            if let Err(e) = stdin.write_all(&bytes).await {
                // Child closed its end early; kill it and fall back to the
                // unmodified payload upstream.
                debug!(hook = %self.path.display(), event = event.as_str(), "hook stdin write failed: {e}");
                let _ = child.start_kill();
                return Err(HookError::BrokenPipe);
            }
            let _ = stdin.shutdown().await;
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(HookError::Io)?,
            // Dropping the future kills the child (kill_on_drop).
            Err(_) => return Err(HookError::Timeout),
        };

        match output.status.code() {
            Some(0) => Ok(SubprocessOutcome::Allowed(parse_stdout(&output.stdout))),
            Some(2) => Ok(SubprocessOutcome::Blocked(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
            code => Err(HookError::Failed(format!(
                "exit {:?}: {}",
                code,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

fn parse_stdout(stdout: &[u8]) -> Option<Map<String, Value>> {
    let text = std::str::from_utf8(stdout).ok()?;
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}
