//! Port ownership guard.
//!
//! Classifies a TCP port as free, owned by this proxy, occupied by an
//! unrelated process, or unknown, using the system process listing plus an
//! optional health probe. Never raises: when `lsof` is missing or times
//! out, `unknown` is the answer and the supervisor decides. Runs as its own
//! CLI binary, never concurrently with the server in one process.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Command substrings that identify our own proxy process.
pub const DEFAULT_EXPECTED_MARKERS: &[&str] = &["codex-plus", "codex_plus"];

/// Health probe budget.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

const LSOF_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
enum ListingError {
    #[error("lsof command not available")]
    LsofMissing,
    #[error("lsof timed out")]
    Timeout,
    #[error("lsof failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Guard verdict for one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Free,
    OwnedByProxy,
    OccupiedOther,
    Unknown,
}

impl PortState {
    /// Distinct exit codes so supervisor scripts can branch on `$?`.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::OwnedByProxy => 0,
            Self::Free => 10,
            Self::OccupiedOther => 20,
            Self::Unknown => 30,
        }
    }
}

/// One process listening on the inspected port.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: i32,
    pub command: String,
}

/// Guard output: the verdict plus whatever the listing showed.
#[derive(Debug, Clone, Serialize)]
pub struct PortCheckResult {
    pub state: PortState,
    pub processes: Vec<ProcessInfo>,
}

/// Pure classification over an obtained listing. `health_ok` is the result
/// of the optional probe (false when no probe ran).
pub fn classify_listing(
    processes: &[ProcessInfo],
    expected_markers: &[String],
    health_ok: bool,
) -> PortState {
    if processes.is_empty() {
        return PortState::Free;
    }
    let owned = processes.iter().any(|p| {
        let haystack = p.command.to_ascii_lowercase();
        expected_markers
            .iter()
            .any(|marker| haystack.contains(&marker.to_ascii_lowercase()))
    });
    if owned || health_ok {
        PortState::OwnedByProxy
    } else {
        PortState::OccupiedOther
    }
}

/// Inspects ownership of `port`. Listing failures yield `Unknown`; the
/// health probe only runs when no process command matched a marker.
pub async fn check_port_ownership(
    port: u16,
    expected_markers: &[String],
    health_url: Option<&str>,
    health_timeout: Duration,
) -> PortCheckResult {
    let processes = match list_listeners(port).await {
        Ok(processes) => processes,
        Err(e) => {
            debug!("port guard listing failed: {e}");
            return PortCheckResult {
                state: PortState::Unknown,
                processes: Vec::new(),
            };
        }
    };

    let mut state = classify_listing(&processes, expected_markers, false);
    if state == PortState::OccupiedOther {
        if let Some(url) = health_url {
            if probe_health(url, health_timeout).await {
                state = PortState::OwnedByProxy;
            }
        }
    }
    PortCheckResult { state, processes }
}

/// `lsof -nP -iTCP:<port> -sTCP:LISTEN -Fpc`, parsed. An unsuccessful exit
/// with empty output just means nothing is listening.
async fn list_listeners(port: u16) -> Result<Vec<ProcessInfo>, ListingError> {
    if which::which("lsof").is_err() {
        return Err(ListingError::LsofMissing);
    }
    let run = tokio::process::Command::new("lsof")
        .args([
            "-nP",
            &format!("-iTCP:{port}"),
            "-sTCP:LISTEN",
            "-Fpc",
        ])
        .output();
    let output = tokio::time::timeout(LSOF_TIMEOUT, run)
        .await
        .map_err(|_| ListingError::Timeout)??;
    Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses `-Fpc` field output: `p<pid>` opens a record, `c<command>`
/// completes it.
fn parse_listing(stdout: &str) -> Vec<ProcessInfo> {
    let mut processes = Vec::new();
    let mut pid: Option<i32> = None;
    let mut command: Option<String> = None;

    for line in stdout.lines().filter(|l| !l.is_empty()) {
        let (tag, value) = line.split_at(1);
        match tag {
            "p" => {
                if let (Some(p), Some(c)) = (pid, command.take()) {
                    processes.push(ProcessInfo { pid: p, command: c });
                }
                pid = value.parse().ok();
            }
            "c" => command = Some(value.to_string()),
            _ => {}
        }
    }
    if let (Some(p), Some(c)) = (pid, command) {
        processes.push(ProcessInfo { pid: p, command: c });
    }
    processes
}

async fn probe_health(url: &str, timeout: Duration) -> bool {
    let Ok(client) = reqwest::Client::builder().timeout(timeout).build() else {
        return false;
    };
    match client.get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
