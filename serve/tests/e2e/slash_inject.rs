use serde_json::{json, Value};

use crate::common::spawn_pair;

#[tokio::test]
async fn slash_command_injects_directive_into_responses_payload() {
    let (proxy, mock, _dir) = spawn_pair(vec![Ok(b"data: [DONE]\n\n")], None).await;

    let body = json!({
        "model": "gpt-5",
        "instructions": "sys",
        "input": [{
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": "/echo hi"}]
        }]
    });
    let client = reqwest::Client::new();
    client
        .post(format!("{proxy}/responses"))
        .json(&body)
        .send()
        .await
        .unwrap();

    let seen: Value = serde_json::from_slice(&mock.last_request().unwrap().body).unwrap();
    let text = seen["input"][0]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("[SYSTEM:"), "directive must lead: {text}");
    assert!(text.contains("/echo"));
    assert!(text.ends_with("/echo hi"), "original message must survive");
    // The rest of the envelope is untouched.
    assert_eq!(seen["model"], "gpt-5");
    assert_eq!(seen["instructions"], "sys");
}

#[tokio::test]
async fn history_slash_commands_do_not_trigger_injection() {
    let (proxy, mock, _dir) = spawn_pair(vec![Ok(b"data: [DONE]\n\n")], None).await;

    let body = json!({
        "model": "gpt-5",
        "input": [
            {
                "type": "message",
                "role": "user",
                "content": [{"type": "input_text", "text": "/old from history"}]
            },
            {
                "type": "message",
                "role": "assistant",
                "content": [{"type": "input_text", "text": "done"}]
            },
            {
                "type": "message",
                "role": "user",
                "content": [{"type": "input_text", "text": "no commands here"}]
            }
        ]
    });
    let client = reqwest::Client::new();
    client
        .post(format!("{proxy}/responses"))
        .json(&body)
        .send()
        .await
        .unwrap();

    let seen: Value = serde_json::from_slice(&mock.last_request().unwrap().body).unwrap();
    let latest = seen["input"][2]["content"][0]["text"].as_str().unwrap();
    assert_eq!(latest, "no commands here");
    let history = seen["input"][0]["content"][0]["text"].as_str().unwrap();
    assert_eq!(history, "/old from history");
}
