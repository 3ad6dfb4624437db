//! Request/response logging under a branch-scoped `/tmp` directory.
//!
//! Two artefacts per `responses` request: the outbound payload
//! (`request_payload.json`, pretty-printed) and the `instructions` string
//! (`instructions.txt`) when present. Tool-output callbacks get redacted
//! snapshots under `cereb_conversion/` for Cerebras debugging. Every write
//! is asynchronous and best-effort: failures log at debug level and never
//! affect the request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Default log root: `/tmp/<product>`.
pub const DEFAULT_LOG_DIR: &str = "/tmp/codex_plus";

const TOOL_OUTPUTS_DIR: &str = "cereb_conversion";

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("slug pattern is valid"));

static TOOL_OUTPUTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^responses/[^/]+/tool_outputs$").expect("tool outputs pattern is valid")
});

/// Headers stripped before any snapshot that includes headers.
fn is_sensitive_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "authorization" || name == "cookie" || name.starts_with("x-api-key")
}

/// Validates a git branch name into a filesystem-safe slug. Anything
/// outside `[A-Za-z0-9_-]` (so also `/` and `..`) collapses to `unknown`,
/// which keeps traversal out of the log tree.
pub fn branch_slug(branch: Option<&str>) -> String {
    match branch {
        Some(b) if SLUG_RE.is_match(b) => b.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Current branch of the enclosing git checkout, slugged.
pub async fn current_branch_slug() -> String {
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => {
            let branch = String::from_utf8_lossy(&out.stdout).trim().to_string();
            branch_slug(Some(&branch))
        }
        _ => "unknown".to_string(),
    }
}

/// Drops authentication headers from a header list.
pub fn redact_headers(headers: &[(String, String)]) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !is_sensitive_header(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Whether a request path is the Codex tool-output callback.
pub fn is_tool_outputs_path(path: &str) -> bool {
    TOOL_OUTPUTS_RE.is_match(path.trim_start_matches('/'))
}

/// Branch-scoped payload logger rooted at `/tmp/<product>`.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    base_dir: PathBuf,
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_LOG_DIR))
    }
}

impl RequestLogger {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Fire-and-forget snapshot of an outbound `responses` payload.
    /// Non-`responses` paths and empty bodies are ignored.
    pub fn log_request_payload(&self, body: Bytes, path: &str) {
        if body.is_empty() || !path.trim_start_matches('/').starts_with("responses") {
            return;
        }
        let logger = self.clone();
        tokio::spawn(async move {
            if let Err(e) = logger.write_request_payload(&body).await {
                debug!("request payload log skipped: {e}");
            }
        });
    }

    /// Writes `request_payload.json` (and `instructions.txt` when the
    /// payload carries a string `instructions` field). Returns the
    /// directory written into.
    pub async fn write_request_payload(&self, body: &[u8]) -> std::io::Result<PathBuf> {
        let parsed: Value = serde_json::from_slice(body).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("invalid JSON: {e}"))
        })?;

        let slug = current_branch_slug().await;
        let dir = self.base_dir.join(slug);
        tokio::fs::create_dir_all(&dir).await?;

        let pretty = serde_json::to_vec_pretty(&parsed).unwrap_or_else(|_| body.to_vec());
        tokio::fs::write(dir.join("request_payload.json"), pretty).await?;

        if let Some(instructions) = parsed.get("instructions").and_then(Value::as_str) {
            tokio::fs::write(dir.join("instructions.txt"), instructions).await?;
        }
        Ok(dir)
    }

    /// Fire-and-forget snapshot of a tool-output follow-up request.
    pub fn log_tool_outputs(&self, path: String, body: Bytes, headers: Vec<(String, String)>) {
        let logger = self.clone();
        tokio::spawn(async move {
            match logger.write_tool_outputs(&path, &body, &headers).await {
                Ok(Some(file)) => debug!("recorded tool output follow-up to {}", file.display()),
                Ok(None) => {}
                Err(e) => debug!("tool output snapshot skipped: {e}"),
            }
        });
    }

    /// Writes a redacted `{path, body, headers}` snapshot. `None` means the
    /// body was empty or not JSON and the snapshot was skipped.
    pub async fn write_tool_outputs(
        &self,
        path: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> std::io::Result<Option<PathBuf>> {
        if body.is_empty() {
            debug!("tool output record skipped: empty body");
            return Ok(None);
        }
        let Ok(parsed) = serde_json::from_slice::<Value>(body) else {
            debug!("tool output record skipped: body not JSON");
            return Ok(None);
        };

        let dir = self.base_dir.join(TOOL_OUTPUTS_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let stamp = chrono::Utc::now().timestamp_millis();
        let file = dir.join(format!("tool_outputs_{}_{stamp}.json", std::process::id()));
        let record = serde_json::json!({
            "path": path,
            "body": parsed,
            "headers": redact_headers(headers),
        });
        let pretty = serde_json::to_vec_pretty(&record).unwrap_or_default();
        tokio::fs::write(&file, pretty).await?;
        Ok(Some(file))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
