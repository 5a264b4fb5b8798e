//! Streaming client tests against a mock provider.

use std::time::Duration;

use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatledger_upstream::{ChatMessage, CompletionRequest, Role, StatusCategory, UpstreamClient};

fn request() -> CompletionRequest {
    CompletionRequest {
        model: "gpt-3.5-turbo".to_string(),
        messages: vec![ChatMessage::new(Role::User, "hello")],
        temperature: Some(0.8),
        top_p: Some(1.0),
        max_tokens: Some(1024),
    }
}

fn sse_body() -> String {
    [
        r#"data: {"id":"cmpl-1","choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"data: {"id":"cmpl-1","choices":[{"delta":{"content":"Hel"}}]}"#,
        r#"data: {"id":"cmpl-1","choices":[{"delta":{"content":"lo!"}}]}"#,
        r#"data: {"id":"cmpl-1","choices":[],"usage":{"prompt_tokens":9,"completion_tokens":3,"total_tokens":12}}"#,
        "data: [DONE]",
    ]
    .iter()
    .map(|line| format!("{line}\n\n"))
    .collect()
}

#[tokio::test]
async fn relays_deltas_and_returns_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "stream": true,
            "stream_options": { "include_usage": true }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(), "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let client = UpstreamClient::new(server.uri(), "test-key", Duration::from_secs(5));
    let mut partials = Vec::new();
    let reply = client
        .send(&request(), |partial| partials.push(partial))
        .await
        .unwrap();

    assert_eq!(reply.id, "cmpl-1");
    assert_eq!(reply.text, "Hello!");
    let usage = reply.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 9);
    assert_eq!(usage.completion_tokens, 3);

    let texts: Vec<_> = partials.iter().map(|p| p.text.as_str()).collect();
    assert_eq!(texts, ["Hel", "Hello!"]);
    assert_eq!(partials[1].delta, "lo!");
}

#[tokio::test]
async fn categorizes_known_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(server.uri(), "test-key", Duration::from_secs(5));
    let err = client.send(&request(), |_| {}).await.unwrap_err();

    match err {
        chatledger_upstream::UpstreamError::Status { code, category } => {
            assert_eq!(code, 401);
            assert_eq!(category, StatusCategory::Unauthorized);
        }
        other => panic!("expected categorized status, got {other:?}"),
    }
}

#[tokio::test]
async fn surfaces_uncategorized_statuses_with_raw_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(server.uri(), "test-key", Duration::from_secs(5));
    let err = client.send(&request(), |_| {}).await.unwrap_err();

    match err {
        chatledger_upstream::UpstreamError::Unknown { code, message } => {
            assert_eq!(code, Some(429));
            assert_eq!(message, "rate limited");
        }
        other => panic!("expected unknown status, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_provider_hits_the_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(), "text/event-stream")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = UpstreamClient::new(server.uri(), "test-key", Duration::from_millis(100));
    let err = client.send(&request(), |_| {}).await.unwrap_err();

    assert!(matches!(err, chatledger_upstream::UpstreamError::Timeout(_)));
}
