#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use codex_plus::HookRegistry;
use serde_json::{json, Value};

use crate::common::{spawn_proxy, MockUpstream};

fn write_veto_hook(dir: &Path) {
    let path = dir.join("veto.py");
    std::fs::write(
        &path,
        "#!/usr/bin/env python3\n\"\"\"\nname: veto\ntype: user-prompt-submit\npriority: 10\n\"\"\"\nimport sys\nsys.stdin.read()\nprint('prompt rejected by policy', file=sys.stderr)\nsys.exit(2)\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

async fn proxy_with_veto() -> (String, MockUpstream, tempfile::TempDir) {
    let mock = MockUpstream::new(vec![Ok(b"data: [DONE]\n\n")]);
    let upstream_url = mock.clone().spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let hooks_dir = dir.path().join("hooks");
    std::fs::create_dir_all(&hooks_dir).unwrap();
    write_veto_hook(&hooks_dir);
    let registry = HookRegistry::load(&[hooks_dir]);
    let proxy = spawn_proxy(&upstream_url, None, registry, dir.path()).await;
    (proxy, mock, dir)
}

#[tokio::test]
async fn blocked_prompt_returns_json_403_without_reaching_upstream() {
    let (proxy, mock, _dir) = proxy_with_veto().await;

    let body = json!({
        "model": "gpt-5",
        "input": [{
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": "anything"}]
        }]
    });
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy}/responses"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "BLOCKED_BY_HOOK");
    assert_eq!(body["error"]["reason"], "prompt rejected by policy");
    assert!(mock.last_request().is_none());
}

#[tokio::test]
async fn blocked_streaming_prompt_gets_an_sse_error_event() {
    let (proxy, mock, _dir) = proxy_with_veto().await;

    let body = json!({
        "model": "gpt-5",
        "stream": true,
        "input": [{
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": "anything"}]
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
    assert!(text.starts_with("data: "));
    assert!(text.ends_with("\n\n"));
    let payload: Value = serde_json::from_str(text.trim_start_matches("data: ").trim()).unwrap();
    assert_eq!(payload["error"]["code"], "BLOCKED_BY_HOOK");
    assert!(mock.last_request().is_none());
}
