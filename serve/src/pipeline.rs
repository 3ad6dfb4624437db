//! Request pipeline: the catch-all route behind the HTTP surface.
//!
//! Per request: read the body (bounded), run pre-input hooks, run the
//! blocking user-prompt-submit chain, inject slash directives, optionally
//! transform the dialect, snapshot the outbound payload, forward over the
//! impersonating transport, wrap the reply stream with the SSE colouriser,
//! run post-output hooks against the response metadata, and record the
//! coordination-overhead metric when the stream ends.
//!
//! Error shape follows the client's commitment: once a stream was
//! requested, failures surface as in-band SSE error events; otherwise as
//! JSON with an error code.

use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde_json::{json, Map, Value};
use sse_color::SseColorizer;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use codex_plus::dialect::DialectError;
use codex_plus::{
    logger, sse_error_event, to_chat_completions, HookEvent, MetricKind, RequestEnvelope,
};

use super::app::AppState;

const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Outbound path once the transformer rewrote a `responses` payload into
/// the flat dialect.
const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

pub(crate) async fn handle_proxy(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let t0 = Instant::now();
    let (parts, inbound_body) = req.into_parts();
    let method = parts.method.to_string();
    let path = parts.uri.path().trim_start_matches('/').to_string();
    let query = parts.uri.query().map(str::to_string);
    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();

    let body = match axum::body::to_bytes(inbound_body, state.settings.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return error_json(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                "request body exceeds the configured limit",
            );
        }
    };

    debug!("proxying {} /{}", method, path);

    // Registry snapshot: immutable for the rest of this request even if a
    // reload swaps the pointer underneath.
    let hooks = state.hooks_snapshot();

    // Best-effort parse; non-JSON bodies flow through byte-identical.
    let original: Option<Value> = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };

    let transform_required = state.settings.transform.is_some() && path.starts_with("responses");
    if original.is_none() && transform_required && !body.is_empty() {
        return error_json(
            StatusCode::BAD_REQUEST,
            "TRANSFORM_ERROR",
            "request body is not valid JSON",
        );
    }

    // Pre-input hooks may mutate the parsed body.
    let working = match original.clone() {
        Some(value) => Some(hooks.run_chain(HookEvent::PreInput, value).await.payload),
        None => None,
    };
    let mut mutated = working != original;

    // Normalise to the dialect sum.
    let mut envelope = match working.as_ref() {
        Some(value) => match RequestEnvelope::from_value(value.clone()) {
            Ok(env) => Some(env),
            Err(e @ DialectError::Malformed { .. }) if transform_required => {
                return error_json(StatusCode::BAD_REQUEST, "TRANSFORM_ERROR", &e.to_string());
            }
            Err(DialectError::UnrecognisedShape) if transform_required => {
                return error_json(
                    StatusCode::BAD_REQUEST,
                    "TRANSFORM_ERROR",
                    "body matches neither request dialect",
                );
            }
            Err(_) => None,
        },
        None => None,
    };
    let stream_requested = envelope
        .as_ref()
        .map(RequestEnvelope::stream_requested)
        .unwrap_or(false);

    // Blocking user-prompt gate.
    if let Some(prompt) = envelope.as_ref().and_then(RequestEnvelope::latest_user_text) {
        let outcome = hooks
            .run_chain(HookEvent::UserPromptSubmit, json!({ "prompt": prompt }))
            .await;
        if let Some(reason) = outcome.blocked {
            return blocked_response(stream_requested, &reason);
        }
    }

    // Slash-command directive injection.
    if let Some(env) = envelope.as_mut() {
        if !state.resolver.apply(env).is_empty() {
            mutated = true;
        }
    }

    // Codex tool-output callback: redacted snapshot for Cerebras debugging.
    if logger::is_tool_outputs_path(&path) {
        let snapshot = envelope
            .as_ref()
            .map(|env| Bytes::from(env.to_vec()))
            .unwrap_or_else(|| body.clone());
        state
            .logger
            .log_tool_outputs(path.clone(), snapshot, headers.clone());
    }

    // Dialect transform for flat-dialect upstreams; the outbound path moves
    // with the payload shape.
    let mut outbound_path = path.clone();
    if let Some(config) = state.settings.transform.as_ref() {
        if let Some(env) = envelope.take() {
            envelope = Some(RequestEnvelope::ChatCompletions(to_chat_completions(
                env, config,
            )));
            mutated = true;
            if path.starts_with("responses") {
                outbound_path = CHAT_COMPLETIONS_PATH.to_string();
            }
        }
    }

    // Re-serialise only when something changed; otherwise forward the
    // inbound bytes untouched. The transport recomputes content-length.
    let out_body: Bytes = if mutated {
        match (&envelope, &working) {
            (Some(env), _) => Bytes::from(env.to_vec()),
            (None, Some(value)) => Bytes::from(serde_json::to_vec(value).unwrap_or_default()),
            (None, None) => body.clone(),
        }
    } else {
        body.clone()
    };

    // Outbound payload snapshot (responses routes only; best-effort).
    state.logger.log_request_payload(out_body.clone(), &path);

    let send_start = Instant::now();
    let reply = match state
        .upstream
        .send(
            &method,
            &outbound_path,
            query.as_deref(),
            &headers,
            (!out_body.is_empty()).then(|| out_body.clone()),
            stream_requested,
        )
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!("upstream request failed: {e}");
            return upstream_error_response(stream_requested, &e.to_string());
        }
    };
    let initial_upstream_wait = send_start.elapsed();

    // Post-output hooks see status and redacted headers only; the body
    // stays a stream.
    let response_meta = json!({
        "status": reply.status,
        "headers": logger::redact_headers(&reply.headers),
    });
    let _ = hooks.run_chain(HookEvent::PostOutput, response_meta).await;

    stream_response(state, reply, t0, initial_upstream_wait, path)
}

/// Bridges the upstream byte stream to the client through the colouriser,
/// emitting an in-band error event on mid-stream failure and recording the
/// coordination metric when the stream closes.
fn stream_response(
    state: Arc<AppState>,
    reply: codex_plus::UpstreamResponse,
    t0: Instant,
    initial_upstream_wait: std::time::Duration,
    path: String,
) -> Response {
    let codex_plus::UpstreamResponse {
        status,
        headers,
        body: mut upstream_body,
    } = reply;

    let (tx, rx) = mpsc::channel::<Result<Bytes, std::convert::Infallible>>(STREAM_CHANNEL_CAPACITY);
    let colorize = state.settings.colorize;

    tokio::spawn(async move {
        let mut colorizer = SseColorizer::new();
        let mut upstream_time = initial_upstream_wait;
        let mut cancelled = false;
        let mut failed = false;

        loop {
            let wait = Instant::now();
            let next = upstream_body.next().await;
            upstream_time += wait.elapsed();
            match next {
                Some(Ok(chunk)) => {
                    let out: Bytes = if colorize {
                        Bytes::from(colorizer.feed(&chunk))
                    } else {
                        chunk
                    };
                    if out.is_empty() {
                        continue;
                    }
                    if tx.send(Ok(out)).await.is_err() {
                        // Client went away: stop reading upstream promptly.
                        cancelled = true;
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("upstream mid-stream error: {e}");
                    failed = true;
                    let event = sse_error_event("UPSTREAM_ERROR", &e.to_string());
                    let _ = tx.send(Ok(Bytes::from(event))).await;
                    break;
                }
                None => {
                    let tail = colorizer.finish();
                    if !tail.is_empty() {
                        let _ = tx.send(Ok(Bytes::from(tail))).await;
                    }
                    break;
                }
            }
        }
        drop(upstream_body);

        let coordination_ms =
            t0.elapsed().saturating_sub(upstream_time).as_secs_f64() * 1000.0;
        let mut context = Map::new();
        context.insert("path".to_string(), Value::String(path));
        context.insert("cancelled".to_string(), Value::Bool(cancelled));
        context.insert("success".to_string(), Value::Bool(!failed));
        state
            .metrics
            .record(MetricKind::CoordinationOverhead, coordination_ms, context);
    });

    let mut builder = Response::builder().status(status);
    for (name, value) in &headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn error_json(status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({"error": {"code": code, "message": message}});
    (status, axum::Json(body)).into_response()
}

/// Hook veto: SSE error event when the client committed to a stream,
/// JSON 403 otherwise.
fn blocked_response(streaming: bool, reason: &str) -> Response {
    if streaming {
        sse_single_event(StatusCode::OK, sse_error_event("BLOCKED_BY_HOOK", reason))
    } else {
        let body = json!({"error": {"code": "BLOCKED_BY_HOOK", "reason": reason}});
        (StatusCode::FORBIDDEN, axum::Json(body)).into_response()
    }
}

fn upstream_error_response(streaming: bool, detail: &str) -> Response {
    if streaming {
        sse_single_event(
            StatusCode::BAD_GATEWAY,
            sse_error_event("UPSTREAM_ERROR", detail),
        )
    } else {
        error_json(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", detail)
    }
}

fn sse_single_event(status: StatusCode, event: Vec<u8>) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from(event))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
