//! First-party compiled hooks.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Hook, HookAction, HookError, HookEvent};

const GIT_HEADER_SCRIPT: &str = ".claude/hooks/git-header.sh";
const GIT_HEADER_TIMEOUT: Duration = Duration::from_secs(10);

/// Post-output hook that prints the repository's git header after each
/// response, when the enclosing checkout provides a header script.
/// Purely observational: failures are logged and the response is untouched.
pub struct GitHeaderHook;

impl GitHeaderHook {
    async fn git_toplevel() -> Option<PathBuf> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let path = String::from_utf8(output.stdout).ok()?;
        Some(PathBuf::from(path.trim()))
    }

    async fn print_header() {
        let Some(toplevel) = Self::git_toplevel().await else {
            debug!("git header: not inside a git checkout");
            return;
        };
        let script = toplevel.join(GIT_HEADER_SCRIPT);
        if !script.is_file() {
            debug!("git header script not found at {}", script.display());
            return;
        }
        let run = Command::new(&script).output();
        match tokio::time::timeout(GIT_HEADER_TIMEOUT, run).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if !stdout.trim().is_empty() {
                    info!("git header:");
                    for line in stdout.trim().lines() {
                        info!("   {line}");
                    }
                }
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!("git header script failed: {}", stderr.trim());
                }
            }
            Ok(Err(e)) => debug!("git header script did not run: {e}"),
            Err(_) => warn!("git header script timed out"),
        }
    }
}

#[async_trait]
impl Hook for GitHeaderHook {
    fn name(&self) -> &str {
        "git-header"
    }

    async fn run(&self, event: HookEvent, _payload: &mut Value) -> Result<HookAction, HookError> {
        if event == HookEvent::PostOutput {
            Self::print_header().await;
        }
        Ok(HookAction::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn never_fails_and_never_mutates_payload() {
        let hook = GitHeaderHook;
        let mut payload = json!({"status": 200});
        let action = hook.run(HookEvent::PostOutput, &mut payload).await.unwrap();
        assert!(matches!(action, HookAction::Continue));
        assert_eq!(payload, json!({"status": 200}));
    }
}
