//! Hook discovery, registry, and chain execution.
//!
//! Hooks extend the proxy at fixed lifecycle events. They come in two
//! shapes: compiled [`Hook`] implementations registered at startup
//! (first-party), and on-disk scripts with front-matter metadata run as
//! subprocesses (third-party, strongly isolated). Within one event type the
//! chain is totally ordered by `(priority, source_path)`; one hook's
//! failure never prevents later hooks from running.
//!
//! The registry is immutable once built: reload builds a fresh registry
//! and the owner swaps the pointer, so in-flight chains keep their snapshot.

mod builtin;
mod frontmatter;
mod subprocess;

pub use builtin::GitHeaderHook;
pub use frontmatter::{parse_front_matter, HookMeta};
pub use subprocess::{SubprocessHook, SubprocessOutcome};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Default hard timeout for one hook invocation.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_PRIORITY: i64 = 100;

/// Lifecycle events a hook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    PreInput,
    PostOutput,
    PreToolUse,
    PostToolUse,
    UserPromptSubmit,
    Notification,
    Stop,
    SessionStart,
    SessionEnd,
    PreCompact,
}

impl HookEvent {
    /// Accepts both spellings found in hook files: kebab-case
    /// (`pre-input`) and CamelCase (`PreToolUse`).
    pub fn parse(s: &str) -> Option<Self> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "preinput" => Some(Self::PreInput),
            "postoutput" => Some(Self::PostOutput),
            "pretooluse" => Some(Self::PreToolUse),
            "posttooluse" => Some(Self::PostToolUse),
            "userpromptsubmit" => Some(Self::UserPromptSubmit),
            "notification" => Some(Self::Notification),
            "stop" => Some(Self::Stop),
            "sessionstart" => Some(Self::SessionStart),
            "sessionend" => Some(Self::SessionEnd),
            "precompact" => Some(Self::PreCompact),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreInput => "pre-input",
            Self::PostOutput => "post-output",
            Self::PreToolUse => "pre-tool-use",
            Self::PostToolUse => "post-tool-use",
            Self::UserPromptSubmit => "user-prompt-submit",
            Self::Notification => "notification",
            Self::Stop => "stop",
            Self::SessionStart => "session-start",
            Self::SessionEnd => "session-end",
            Self::PreCompact => "pre-compact",
        }
    }

    /// Blocking events let a subprocess veto the request with exit code 2.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::PreToolUse | Self::UserPromptSubmit)
    }
}

/// Failures at the per-hook boundary. The chain logs these and continues
/// with the last-known-good payload.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook io: {0}")]
    Io(#[from] std::io::Error),
    #[error("hook timed out")]
    Timeout,
    #[error("hook stdin closed early")]
    BrokenPipe,
    #[error("hook failed: {0}")]
    Failed(String),
}

/// What a hook asks the pipeline to do next.
#[derive(Debug, Clone)]
pub enum HookAction {
    Continue,
    Block { reason: String },
}

/// Compiled (in-process) hook: one async entry point for all events.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, event: HookEvent, payload: &mut Value) -> Result<HookAction, HookError>;
}

/// Metadata for one registered hook.
#[derive(Debug, Clone)]
pub struct HookDescriptor {
    pub name: String,
    pub event: HookEvent,
    pub priority: i64,
    pub enabled: bool,
    pub source_path: PathBuf,
}

enum HookInvoker {
    InProcess(Arc<dyn Hook>),
    Subprocess(SubprocessHook),
}

/// One hook in the registry: descriptor plus its invoker.
pub struct RegisteredHook {
    pub descriptor: HookDescriptor,
    invoker: HookInvoker,
}

/// Result of running a chain: the (possibly mutated) payload, plus the
/// block reason when a blocking event was vetoed.
#[derive(Debug)]
pub struct ChainOutcome {
    pub payload: Value,
    pub blocked: Option<String>,
}

/// Priority-ordered hooks per event type. Built once, shared read-only.
pub struct HookRegistry {
    by_event: HashMap<HookEvent, Vec<Arc<RegisteredHook>>>,
    hook_timeout: Duration,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            by_event: HashMap::new(),
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Overrides the per-hook timeout (tests use short values).
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    /// Default discovery roots: project `.codexplus/hooks` and
    /// `.claude/hooks`, then the user-home equivalents.
    pub fn default_hook_dirs() -> Vec<PathBuf> {
        let mut dirs_out = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            dirs_out.push(cwd.join(".codexplus/hooks"));
            dirs_out.push(cwd.join(".claude/hooks"));
        }
        if let Some(home) = dirs::home_dir() {
            dirs_out.push(home.join(".codexplus/hooks"));
            dirs_out.push(home.join(".claude/hooks"));
        }
        dirs_out
    }

    /// Scans `dirs` for `*.py` hook files. A file whose front-matter fails
    /// to parse is dropped with a warning; it never prevents other hooks
    /// from loading.
    pub fn load(dirs: &[PathBuf]) -> Self {
        let mut registry = Self::new();
        for dir in dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("py") {
                    continue;
                }
                match std::fs::read_to_string(&path) {
                    Ok(content) => registry.register_file(&path, &content),
                    Err(e) => warn!("unreadable hook {}: {e}", path.display()),
                }
            }
        }
        registry.sort();
        registry
    }

    fn register_file(&mut self, path: &Path, content: &str) {
        let Some(meta) = parse_front_matter(content) else {
            warn!("dropping hook without front-matter: {}", path.display());
            return;
        };
        let Some(event) = meta.event else {
            warn!("dropping hook with unknown event type: {}", path.display());
            return;
        };
        let name = meta.name.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let descriptor = HookDescriptor {
            name,
            event,
            priority: meta.priority.unwrap_or(DEFAULT_PRIORITY),
            enabled: meta.enabled.unwrap_or(true),
            source_path: path.to_path_buf(),
        };
        self.push(
            descriptor,
            HookInvoker::Subprocess(SubprocessHook::new(path.to_path_buf())),
        );
    }

    /// Registers a compiled first-party hook.
    pub fn register_builtin(&mut self, event: HookEvent, priority: i64, hook: Arc<dyn Hook>) {
        let descriptor = HookDescriptor {
            name: hook.name().to_string(),
            event,
            priority,
            enabled: true,
            source_path: PathBuf::from(format!("builtin:{}", hook.name())),
        };
        self.push(descriptor, HookInvoker::InProcess(hook));
        self.sort();
    }

    fn push(&mut self, descriptor: HookDescriptor, invoker: HookInvoker) {
        self.by_event
            .entry(descriptor.event)
            .or_default()
            .push(Arc::new(RegisteredHook { descriptor, invoker }));
    }

    fn sort(&mut self) {
        for hooks in self.by_event.values_mut() {
            hooks.sort_by(|a, b| {
                (a.descriptor.priority, &a.descriptor.source_path)
                    .cmp(&(b.descriptor.priority, &b.descriptor.source_path))
            });
        }
    }

    pub fn hooks_for(&self, event: HookEvent) -> &[Arc<RegisteredHook>] {
        self.by_event.get(&event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn descriptors(&self, event: HookEvent) -> Vec<&HookDescriptor> {
        self.hooks_for(event).iter().map(|h| &h.descriptor).collect()
    }

    /// Runs the chain for `event` sequentially. Each hook sees the payload
    /// produced by its predecessors; per-hook failures are logged and the
    /// prior payload flows on. On exit code 2 for a blocking event the
    /// chain short-circuits with the reason.
    pub async fn run_chain(&self, event: HookEvent, payload: Value) -> ChainOutcome {
        let mut payload = payload;
        for hook in self.hooks_for(event) {
            if !hook.descriptor.enabled {
                continue;
            }
            match &hook.invoker {
                HookInvoker::InProcess(h) => {
                    let mut candidate = payload.clone();
                    match tokio::time::timeout(self.hook_timeout, h.run(event, &mut candidate))
                        .await
                    {
                        Ok(Ok(HookAction::Continue)) => payload = candidate,
                        Ok(Ok(HookAction::Block { reason })) if event.is_blocking() => {
                            return ChainOutcome {
                                payload,
                                blocked: Some(reason),
                            };
                        }
                        Ok(Ok(HookAction::Block { reason })) => {
                            warn!(
                                hook = %hook.descriptor.name,
                                "block ignored on non-blocking event {}: {reason}",
                                event.as_str()
                            );
                        }
                        Ok(Err(e)) => {
                            warn!(hook = %hook.descriptor.name, "hook error: {e}");
                        }
                        Err(_) => {
                            warn!(hook = %hook.descriptor.name, "hook timed out");
                        }
                    }
                }
                HookInvoker::Subprocess(sub) => {
                    match sub.invoke(event, &payload, self.hook_timeout).await {
                        Ok(SubprocessOutcome::Allowed(Some(updates))) => {
                            merge_object(&mut payload, updates);
                        }
                        Ok(SubprocessOutcome::Allowed(None)) => {}
                        Ok(SubprocessOutcome::Blocked(reason)) if event.is_blocking() => {
                            return ChainOutcome {
                                payload,
                                blocked: Some(reason),
                            };
                        }
                        Ok(SubprocessOutcome::Blocked(reason)) => {
                            warn!(
                                hook = %hook.descriptor.name,
                                "block ignored on non-blocking event {}: {reason}",
                                event.as_str()
                            );
                        }
                        Err(e) => {
                            warn!(hook = %hook.descriptor.name, "hook error, continuing with prior payload: {e}");
                        }
                    }
                }
            }
        }
        ChainOutcome {
            payload,
            blocked: None,
        }
    }
}

/// Shallow-merges a hook's stdout object into the payload; later keys win.
fn merge_object(payload: &mut Value, updates: serde_json::Map<String, Value>) {
    match payload.as_object_mut() {
        Some(obj) => obj.extend(updates),
        None => *payload = Value::Object(updates),
    }
}
