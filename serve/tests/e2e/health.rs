use crate::common::spawn_pair;

#[tokio::test]
async fn health_answers_locally_and_is_never_forwarded() {
    let (proxy, mock, _dir) = spawn_pair(vec![Ok(b"data: [DONE]\n\n")], None).await;

    let response = reqwest::get(format!("{proxy}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"status": "healthy"}));

    assert!(mock.last_request().is_none(), "health must not reach upstream");
}
