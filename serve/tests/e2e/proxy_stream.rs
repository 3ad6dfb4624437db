use serde_json::json;

use crate::common::spawn_pair;

const ASSISTANT_DELTA: &[u8] =
    b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Hello\"}}]}\n\n";

#[tokio::test]
async fn forwards_stream_with_colorized_deltas_and_verbatim_done() {
    let (proxy, mock, _dir) =
        spawn_pair(vec![Ok(ASSISTANT_DELTA), Ok(b"data: [DONE]\n\n")], None).await;

    let body = json!({
        "model": "gpt-5",
        "input": [{
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": "say hello"}]
        }],
        "stream": true
    });
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy}/responses"))
        .header("authorization", "Bearer test-token")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();

    // Assistant content is wrapped in the lavender 24-bit escape, reset after.
    assert!(text.contains("\u{1b}[38;2;189;166;255mHello\u{1b}[0m"));
    // The sentinel stays byte-identical.
    assert!(text.ends_with("data: [DONE]\n\n"));
    // Stripped of colour, the payload is deep-equal to what upstream sent.
    let stripped = sse_color::strip_ansi(&text);
    let first_event = stripped.split("\n\n").next().unwrap();
    let payload: serde_json::Value =
        serde_json::from_str(first_event.trim_start_matches("data: ")).unwrap();
    assert_eq!(payload["choices"][0]["delta"]["content"], "Hello");

    // Upstream saw the same path and the auth header; hop-by-hop headers
    // were dropped.
    let seen = mock.last_request().unwrap();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.path, "/responses");
    assert!(seen
        .headers
        .iter()
        .any(|(n, v)| n == "authorization" && v == "Bearer test-token"));
    assert!(!seen.headers.iter().any(|(n, _)| n == "content-encoding"));
}

#[tokio::test]
async fn unmodified_payload_is_forwarded_byte_identical() {
    let (proxy, mock, _dir) = spawn_pair(vec![Ok(b"data: [DONE]\n\n")], None).await;

    // No slash commands, no transform: the body must reach upstream as sent.
    let body = r#"{"model":"gpt-5","input":[{"type":"message","role":"user","content":[{"type":"input_text","text":"plain words"}]}],"store":false}"#;
    let client = reqwest::Client::new();
    client
        .post(format!("{proxy}/responses"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();

    let seen = mock.last_request().unwrap();
    assert_eq!(seen.body, body.as_bytes());
}

#[tokio::test]
async fn non_json_body_on_other_path_passes_through() {
    let (proxy, mock, _dir) = spawn_pair(vec![Ok(b"ok")], None).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy}/some/other/endpoint"))
        .body("plain text, not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let seen = mock.last_request().unwrap();
    assert_eq!(seen.path, "/some/other/endpoint");
    assert_eq!(seen.body, b"plain text, not json");
}

#[tokio::test]
async fn empty_body_is_forwarded_unchanged() {
    let (proxy, mock, _dir) = spawn_pair(vec![Ok(b"ok")], None).await;

    let client = reqwest::Client::new();
    let response = client.get(format!("{proxy}/models")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let seen = mock.last_request().unwrap();
    assert_eq!(seen.method, "GET");
    assert!(seen.body.is_empty());
}
