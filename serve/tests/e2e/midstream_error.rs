use serde_json::{json, Value};

use crate::common::spawn_pair;

const FIRST_CHUNK: &[u8] =
    b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"partial\"}}]}\n\n";

#[tokio::test]
async fn upstream_failure_mid_stream_yields_one_error_event_then_eof() {
    let (proxy, _mock, _dir) = spawn_pair(
        vec![Ok(FIRST_CHUNK), Err("connection reset by upstream")],
        None,
    )
    .await;

    let body = json!({
        "model": "gpt-5",
        "stream": true,
        "input": [{
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": "go"}]
        }]
    });
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy}/responses"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();

    let events: Vec<&str> = text
        .split("\n\n")
        .filter(|e| !e.trim().is_empty())
        .collect();
    // The delivered chunk plus exactly one in-band error event.
    assert_eq!(events.len(), 2, "events: {events:?}");
    assert!(sse_color::strip_ansi(events[0]).contains("partial"));

    let error: Value =
        serde_json::from_str(events[1].trim_start_matches("data: ").trim()).unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"]["code"], "UPSTREAM_ERROR");
    assert!(!error["error"]["message"].as_str().unwrap().is_empty());
}
