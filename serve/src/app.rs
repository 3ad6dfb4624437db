//! Axum app: shared state and router.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{routing::get, Json, Router};
use codex_plus::{
    GitHeaderHook, HookEvent, HookRegistry, PerformanceConfig, PerformanceMonitor, RequestLogger,
    Settings, SlashCommandResolver, UpstreamClient, UpstreamError,
};
use serde_json::{json, Value};

use super::pipeline;

/// Priority of the built-in git-header post-output hook.
const GIT_HEADER_PRIORITY: i64 = 90;

/// Shared per-process state. Hook reloads swap the registry pointer; each
/// request takes a snapshot at start and keeps it for its lifetime.
pub struct AppState {
    pub settings: Settings,
    pub upstream: UpstreamClient,
    pub hooks: ArcSwap<HookRegistry>,
    pub metrics: PerformanceMonitor,
    pub logger: RequestLogger,
    pub resolver: SlashCommandResolver,
}

impl AppState {
    /// Builds state from resolved settings: impersonating upstream client,
    /// hook registry from the default directories plus built-ins, metric
    /// sink from the persisted performance config.
    pub fn from_settings(settings: Settings) -> Result<Arc<Self>, UpstreamError> {
        let registry = load_registry();
        let upstream = UpstreamClient::new(settings.upstream_url.clone())?;
        let perf_config = PerformanceConfig::load(&PerformanceConfig::default().config_path());
        Ok(Arc::new(Self {
            settings,
            upstream,
            hooks: ArcSwap::from_pointee(registry),
            metrics: PerformanceMonitor::new(perf_config),
            logger: RequestLogger::default(),
            resolver: SlashCommandResolver::new(),
        }))
    }

    /// Assembles state from explicit parts (tests, embedding).
    pub fn with_parts(
        settings: Settings,
        upstream: UpstreamClient,
        registry: HookRegistry,
        metrics: PerformanceMonitor,
        logger: RequestLogger,
        resolver: SlashCommandResolver,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            upstream,
            hooks: ArcSwap::from_pointee(registry),
            metrics,
            logger,
            resolver,
        })
    }

    /// Registry snapshot for one request.
    pub fn hooks_snapshot(&self) -> Arc<HookRegistry> {
        self.hooks.load_full()
    }

    /// Rebuilds the registry from disk and swaps it in atomically.
    /// In-flight requests keep their snapshot.
    pub fn reload_hooks(&self) {
        self.hooks.store(Arc::new(load_registry()));
    }
}

fn load_registry() -> HookRegistry {
    let mut registry = HookRegistry::load(&HookRegistry::default_hook_dirs());
    registry.register_builtin(
        HookEvent::PostOutput,
        GIT_HEADER_PRIORITY,
        Arc::new(GitHeaderHook),
    );
    registry
}

/// `GET /health` is the only special-cased route; everything else is the
/// pipeline's catch-all.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(pipeline::handle_proxy)
        .with_state(state)
}

/// Never forwarded, never hooked.
async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}
