//! Upstream transport over a browser-fingerprint TLS client.
//!
//! The ChatGPT backend rejects handshakes from generic HTTP clients, so all
//! upstream traffic goes through a client that emulates a recent Chrome
//! TLS/HTTP2 fingerprint. Streams are yielded chunk by chunk, never
//! accumulated; transient pre-first-byte failures get exactly one retry.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use wreq::header::{HeaderMap, HeaderName, HeaderValue};
use wreq_util::Emulation;

/// Upstream connect budget.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Total budget for non-streaming requests. Streams are unbounded; the
/// upstream drives.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const RETRY_DELAY: Duration = Duration::from_millis(250);
const MAX_ATTEMPTS: u32 = 2;

/// Request headers never forwarded upstream: `host` is recomputed by the
/// client and the body may have been rewritten.
const SKIPPED_REQUEST_HEADERS: &[&str] = &["host", "content-length", "content-encoding"];
/// Response headers dropped before streaming back: we re-chunk the body.
const SKIPPED_RESPONSE_HEADERS: &[&str] = &["content-length", "content-encoding"];

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream client: {0}")]
    Client(wreq::Error),
    #[error("upstream transport: {0}")]
    Transport(wreq::Error),
    #[error("invalid request method: {0}")]
    Method(String),
}

/// One streamed upstream reply: status, filtered headers, chunked body.
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>,
}

/// HTTP client bound to one upstream base URL.
pub struct UpstreamClient {
    client: wreq::Client,
    base: Url,
}

impl UpstreamClient {
    /// Builds the impersonating client. The fingerprint profile matches the
    /// browser build the upstream firewall accepts.
    pub fn new(base: Url) -> Result<Self, UpstreamError> {
        let client = wreq::Client::builder()
            .emulation(Emulation::Chrome124)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(UpstreamError::Client)?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Joins the inbound path and query onto the base URL.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        let base = self.base.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        match query {
            Some(q) if !q.is_empty() => format!("{base}/{path}?{q}"),
            _ => format!("{base}/{path}"),
        }
    }

    /// Forwards one request. Retries once on a transport-level failure
    /// before any response byte has arrived; once a response exists, errors
    /// surface mid-stream instead.
    pub async fn send(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        headers: &[(String, String)],
        body: Option<Bytes>,
        streaming: bool,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.target_url(path, query);
        let method = wreq::Method::from_bytes(method.as_bytes())
            .map_err(|_| UpstreamError::Method(method.to_string()))?;
        let header_map = build_header_map(headers);

        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let mut request = self
                .client
                .request(method.clone(), url.as_str())
                .headers(header_map.clone());
            if let Some(ref body) = body {
                request = request.body(body.clone());
            }
            if !streaming {
                request = request.timeout(REQUEST_TIMEOUT);
            }

            match request.send().await {
                Ok(response) => {
                    info!("{} {} -> {}", method, url, response.status());
                    return Ok(into_streamed(response));
                }
                Err(e) => {
                    warn!("upstream attempt {attempt}/{MAX_ATTEMPTS} failed: {e}");
                    last_error = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        // Loop always sets last_error before falling through.
        Err(UpstreamError::Transport(last_error.expect("at least one attempt ran")))
    }
}

fn into_streamed(response: wreq::Response) -> UpstreamResponse {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter(|(name, _)| {
            !SKIPPED_RESPONSE_HEADERS.contains(&name.as_str().to_ascii_lowercase().as_str())
        })
        .filter_map(|(name, value)| {
            Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();
    // Chunk-by-chunk pull; never accumulates the body.
    let body = futures_util::stream::try_unfold(response, |mut response| async move {
        match response.chunk().await {
            Ok(Some(chunk)) => Ok(Some((chunk, response))),
            Ok(None) => Ok(None),
            Err(e) => Err(UpstreamError::Transport(e)),
        }
    });
    UpstreamResponse {
        status,
        headers,
        body: Box::pin(body),
    }
}

/// Converts inbound header pairs to the client's map, dropping the ones the
/// transport recomputes. Invalid names or values are skipped, not fatal.
fn build_header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in filter_request_headers(headers) {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        map.append(name, value);
    }
    map
}

/// Header pairs that survive forwarding.
pub fn filter_request_headers(headers: &[(String, String)]) -> Vec<(&String, &String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            !SKIPPED_REQUEST_HEADERS.contains(&name.to_ascii_lowercase().as_str())
        })
        .map(|(n, v)| (n, v))
        .collect()
}

/// In-band SSE error frame, used for mid-stream failures and for errors on
/// requests the client asked to stream.
pub fn sse_error_event(code: &str, message: &str) -> Vec<u8> {
    let payload = serde_json::json!({
        "type": "error",
        "error": { "code": code, "message": message }
    });
    format!("data: {payload}\n\n").into_bytes()
}
