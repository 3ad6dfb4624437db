use codex_plus::TransformConfig;
use serde_json::{json, Value};

use crate::common::spawn_pair;

#[tokio::test]
async fn responses_payload_is_rewritten_for_the_flat_dialect_upstream() {
    let (proxy, mock, _dir) =
        spawn_pair(vec![Ok(b"data: [DONE]\n\n")], Some(TransformConfig::default())).await;

    let body = json!({
        "model": "gpt-5-codex",
        "instructions": "You are terse.",
        "input": [{
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": "hi"}]
        }],
        "tools": [{
            "type": "function",
            "name": "run",
            "description": "run a command",
            "strict": false,
            "parameters": {"type": "object"}
        }],
        "reasoning": {"effort": "high"},
        "store": false,
        "stream": true,
        "prompt_cache_key": "cache-1"
    });
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy}/responses"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let seen = mock.last_request().unwrap();
    // The outbound path moved with the dialect.
    assert_eq!(seen.path, "/chat/completions");

    let sent: Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(sent["model"], "qwen-3-coder-480b");
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["messages"][0]["content"], "You are terse.");
    assert_eq!(sent["messages"][1]["role"], "user");
    assert_eq!(sent["messages"][1]["content"], "hi");
    assert_eq!(sent["tools"][0]["function"]["name"], "run");
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["temperature"], 0.2);
    assert_eq!(sent["max_tokens"], 4096);

    let text = String::from_utf8(seen.body.clone()).unwrap();
    for dropped in [
        "instructions",
        "\"input\"",
        "reasoning",
        "store",
        "include",
        "prompt_cache_key",
        "strict",
    ] {
        assert!(!text.contains(dropped), "{dropped} leaked upstream: {text}");
    }
}

#[tokio::test]
async fn malformed_body_with_transform_required_is_a_400() {
    let (proxy, mock, _dir) =
        spawn_pair(vec![Ok(b"data: [DONE]\n\n")], Some(TransformConfig::default())).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy}/responses"))
        .header("content-type", "application/json")
        .body("{not valid json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "TRANSFORM_ERROR");
    assert!(mock.last_request().is_none());
}
