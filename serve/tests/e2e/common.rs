//! Shared helpers for e2e tests: a mock upstream that records requests and
//! replays scripted SSE bodies, plus a proxy spawner wired to it.

use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use codex_plus::{
    HookRegistry, PerformanceConfig, PerformanceMonitor, ProviderMode, RequestLogger, Settings,
    SlashCommandResolver, TransformConfig, UpstreamClient,
};
use serve::AppState;
use tokio::net::TcpListener;

/// What the mock upstream saw for the last request.
#[derive(Debug, Clone, Default)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Body chunks the mock upstream streams back. `Err` aborts the connection
/// mid-stream to simulate an upstream transport failure.
pub type ScriptedChunk = Result<&'static [u8], &'static str>;

#[derive(Clone)]
pub struct MockUpstream {
    pub captured: Arc<Mutex<Option<CapturedRequest>>>,
    chunks: Arc<Vec<ScriptedChunk>>,
}

impl MockUpstream {
    pub fn new(chunks: Vec<ScriptedChunk>) -> Self {
        Self {
            captured: Arc::new(Mutex::new(None)),
            chunks: Arc::new(chunks),
        }
    }

    pub fn last_request(&self) -> Option<CapturedRequest> {
        self.captured.lock().unwrap().clone()
    }

    /// Binds the mock on a random port; returns its base URL.
    pub async fn spawn(self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(mock_handler).with_state(self.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }
}

async fn mock_handler(State(mock): State<MockUpstream>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    *mock.captured.lock().unwrap() = Some(CapturedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(n, v)| Some((n.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect(),
        body: body.to_vec(),
    });

    let chunks = mock.chunks.clone();
    let stream = futures_util::stream::iter((0..chunks.len()).map(move |i| match chunks[i] {
        Ok(bytes) => Ok(Bytes::from_static(bytes)),
        Err(reason) => Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, reason)),
    }));

    Response::builder()
        .status(200)
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Proxy settings pointing at the mock upstream. Validation is a startup
/// concern; tests build `Settings` directly so plain-http loopback works.
pub fn test_settings(upstream_url: &str, transform: Option<TransformConfig>) -> Settings {
    Settings {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_body_bytes: 8 * 1024 * 1024,
        provider_mode: if transform.is_some() {
            ProviderMode::Cerebras
        } else {
            ProviderMode::Openai
        },
        upstream_url: url::Url::parse(upstream_url).unwrap(),
        colorize: true,
        transform,
    }
}

/// Spawns the proxy against `upstream_url`; returns its base URL.
pub async fn spawn_proxy(
    upstream_url: &str,
    transform: Option<TransformConfig>,
    registry: HookRegistry,
    log_dir: &std::path::Path,
) -> String {
    let settings = test_settings(upstream_url, transform);
    let upstream = UpstreamClient::new(settings.upstream_url.clone()).unwrap();
    let mut perf = PerformanceConfig::default();
    perf.monitoring.storage_dir = log_dir.join("performance");
    let state = AppState::with_parts(
        settings,
        upstream,
        registry,
        PerformanceMonitor::new(perf),
        RequestLogger::new(log_dir.to_path_buf()),
        SlashCommandResolver::with_dirs(vec![log_dir.join("commands")]),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = serve::run_serve_on_listener(listener, state).await;
    });
    format!("http://{addr}")
}

/// Proxy in front of a fresh mock upstream streaming `chunks`.
pub async fn spawn_pair(
    chunks: Vec<ScriptedChunk>,
    transform: Option<TransformConfig>,
) -> (String, MockUpstream, tempfile::TempDir) {
    let mock = MockUpstream::new(chunks);
    let upstream_url = mock.clone().spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let proxy = spawn_proxy(&upstream_url, transform, HookRegistry::new(), dir.path()).await;
    (proxy, mock, dir)
}
