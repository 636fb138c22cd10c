//! Mock API tests for server-sent event streaming.

use aidispatch::model::{ChatCompletionChunk, ChatCompletionRequest, ChatMessage};
use aidispatch::options::TransportOptions;
use aidispatch::providers::OpenAiProvider;
use aidispatch::{ApiClient, ApiError, ErrorKind, EventStream};
use futures::StreamExt;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    let provider = OpenAiProvider::new("test-api-key").with_base_url(server.uri());
    ApiClient::new(provider, TransportOptions::new()).unwrap()
}

fn chunk(content: &str) -> String {
    let frame = json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    });
    format!("data: {frame}\n\n")
}

/// Five content frames followed by the terminal sentinel.
fn five_frame_body() -> String {
    let mut body: String = ["Hel", "lo", ", ", "wor", "ld"].into_iter().map(chunk).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

async fn mount_stream(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(server)
        .await;
}

fn chat_request() -> ChatCompletionRequest {
    ChatCompletionRequest::new("gpt-4o", vec![ChatMessage::user("Say hello")])
}

#[tokio::test]
async fn test_callback_mode_sees_every_frame() {
    let server = MockServer::start().await;
    mount_stream(&server, five_frame_body()).await;

    let mut calls = 0;
    let mut text = String::new();
    let outcome = client_for(&server)
        .stream_chat_completion_with(chat_request(), &CancellationToken::new(), |item| {
            calls += 1;
            text.push_str(&item.unwrap().payload.delta_text());
        })
        .await;

    assert!(outcome.is_success());
    assert_eq!(calls, 5);
    assert_eq!(text, "Hello, world");
}

#[tokio::test]
async fn test_pull_mode_matches_callback_mode() {
    let server = MockServer::start().await;
    mount_stream(&server, five_frame_body()).await;

    let chunks: Vec<String> = client_for(&server)
        .stream_chat_completion(chat_request(), &CancellationToken::new())
        .await
        .map(|item| item.unwrap().payload.delta_text())
        .collect()
        .await;

    assert_eq!(chunks, ["Hel", "lo", ", ", "wor", "ld"]);
}

#[tokio::test]
async fn test_stream_without_sentinel_completes() {
    let server = MockServer::start().await;
    mount_stream(&server, chunk("only")).await;

    let payloads = client_for(&server)
        .stream_chat_completion(chat_request(), &CancellationToken::new())
        .await
        .collect_payloads()
        .await
        .into_payload()
        .unwrap();

    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].delta_text(), "only");
}

#[tokio::test]
async fn test_event_names_and_ids_are_kept() {
    let server = MockServer::start().await;
    let body = "event: response.created\nid: 1\ndata: {\"n\": 1}\n\n: keep-alive\n\nid: 2\ndata: {\"n\": 2}\n\n";
    Mock::given(method("GET"))
        .and(path("/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let frames: Vec<_> = client_for(&server)
        .stream_get::<Value>("/v1/events", &CancellationToken::new())
        .await
        .collect()
        .await;

    assert_eq!(frames.len(), 2);
    let first = frames[0].as_ref().unwrap();
    assert_eq!(first.event.as_deref(), Some("response.created"));
    assert_eq!(first.id.as_deref(), Some("1"));
    assert_eq!(first.payload["n"], 1);
    let second = frames[1].as_ref().unwrap();
    assert!(second.event.is_none());
    assert_eq!(second.id.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_bad_frame_does_not_end_stream() {
    let server = MockServer::start().await;
    let body = format!("{}data: {{not json\n\n{}data: [DONE]\n\n", chunk("a"), chunk("b"));
    mount_stream(&server, body).await;

    let mut items = Vec::new();
    let outcome = client_for(&server)
        .stream_chat_completion_with(chat_request(), &CancellationToken::new(), |item| {
            items.push(item.map(|frame| frame.payload.delta_text()).map_err(|e| e.kind()));
        })
        .await;

    assert!(outcome.is_success());
    assert_eq!(
        items,
        vec![
            Ok("a".to_string()),
            Err(ErrorKind::Serialization),
            Ok("b".to_string())
        ]
    );
}

#[tokio::test]
async fn test_non_success_status_fails_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "message": "Incorrect API key provided",
                "type": "invalid_request_error",
                "param": null,
                "code": "invalid_api_key"
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let items: Vec<_> = client
        .stream_chat_completion(chat_request(), &CancellationToken::new())
        .await
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    let error = items.into_iter().next().unwrap().unwrap_err();
    assert_eq!(error.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(error.body().and_then(|b| b.code.as_deref()), Some("invalid_api_key"));

    let mut calls = 0;
    let outcome = client
        .stream_chat_completion_with(chat_request(), &CancellationToken::new(), |_| calls += 1)
        .await;
    assert_eq!(calls, 0);
    assert_eq!(outcome.error().map(ApiError::kind), Some(ErrorKind::RemoteApi));
}

#[tokio::test]
async fn test_cancel_from_callback_stops_delivery() {
    let server = MockServer::start().await;
    mount_stream(&server, five_frame_body()).await;

    let cancel = CancellationToken::new();
    let mut calls = 0;
    let outcome = client_for(&server)
        .stream_chat_completion_with(chat_request(), &cancel, |_| {
            calls += 1;
            if calls == 2 {
                cancel.cancel();
            }
        })
        .await;

    assert_eq!(calls, 2);
    assert!(outcome.error().unwrap().is_cancelled());
}

#[tokio::test]
async fn test_cancel_while_pulling() {
    let server = MockServer::start().await;
    mount_stream(&server, five_frame_body()).await;

    let cancel = CancellationToken::new();
    let mut chunks: EventStream<ChatCompletionChunk> = client_for(&server)
        .stream_chat_completion(chat_request(), &cancel)
        .await;

    assert!(chunks.next().await.unwrap().is_ok());
    cancel.cancel();
    assert!(chunks.next().await.unwrap().unwrap_err().is_cancelled());
    assert!(chunks.next().await.is_none());
}

#[tokio::test]
async fn test_invalid_chat_request_fails_without_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let request = ChatCompletionRequest::new("gpt-4o", vec![]);
    let items: Vec<_> = client_for(&server)
        .stream_chat_completion(request, &CancellationToken::new())
        .await
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_ref().unwrap_err().kind(), ErrorKind::Validation);
}
