//! # Codex Plus
//!
//! Core library for a local reverse proxy that sits between a
//! terminal-based coding assistant CLI and an upstream LLM provider. The
//! HTTP surface lives in the `serve` crate; this crate holds everything the
//! request pipeline orchestrates:
//!
//! - **[`hooks`]**: on-disk extension scripts with front-matter metadata,
//!   priority-ordered chains per lifecycle event, per-hook failure
//!   isolation, subprocess and compiled invokers.
//! - **[`slash`]**: `/name args` detection in the latest user message and
//!   execution-directive injection per dialect.
//! - **[`dialect`]**: the responses / chat-completions envelope sum type
//!   and the total transform between them.
//! - **[`upstream`]**: browser-fingerprint TLS transport with bounded
//!   retry and chunked streaming.
//! - **[`logger`]**: branch-scoped payload snapshots with auth redaction.
//! - **[`perf`]**: metric ring buffer, requirement validation, baseline
//!   establishment, CI export.
//! - **[`port_guard`]**: free / owned / occupied / unknown port
//!   classification for the supervisor.
//! - **[`settings`]**: environment-resolved proxy configuration.
//!
//! Key types are re-exported at the crate root.

pub mod dialect;
pub mod hooks;
pub mod logger;
pub mod perf;
pub mod port_guard;
pub mod settings;
pub mod slash;
pub mod upstream;

pub use dialect::{
    to_chat_completions, ChatCompletionsEnvelope, ChatMessage, DialectError, RequestEnvelope,
    ResponsesEnvelope, TransformConfig,
};
pub use hooks::{
    ChainOutcome, GitHeaderHook, Hook, HookAction, HookError, HookEvent, HookRegistry,
};
pub use logger::RequestLogger;
pub use perf::{MetricKind, PerformanceConfig, PerformanceMonitor};
pub use port_guard::{check_port_ownership, PortCheckResult, PortState};
pub use settings::{ConfigError, ProviderMode, Settings};
pub use slash::SlashCommandResolver;
pub use upstream::{sse_error_event, UpstreamClient, UpstreamError, UpstreamResponse};
