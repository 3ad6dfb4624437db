//! HTTP surface for the Codex Plus proxy (axum).
//!
//! Listens on 127.0.0.1:10000 by default. `GET /health` answers locally;
//! every other route delegates to the request pipeline, which forwards to
//! the configured upstream over the fingerprint-impersonating transport.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`AppState`].

mod app;
mod pipeline;

pub use app::{router, AppState};

use std::sync::Arc;

use codex_plus::Settings;
use tokio::net::TcpListener;
use tracing::info;

/// Runs the proxy on an existing listener. Tests bind `127.0.0.1:0` and
/// pass the listener in.
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!(
        "codex-plus proxy listening on http://{} (upstream {})",
        addr,
        state.upstream.base_url()
    );
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Resolves state from `settings`, binds, and serves until shutdown.
pub async fn run_serve(settings: Settings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState::from_settings(settings)?;
    let listener = TcpListener::bind(state.settings.bind_addr()).await?;
    run_serve_on_listener(listener, state).await
}
