//! E2E tests for the provider adapters against local mock servers.
//!
//! Verifies stream normalization, HTTP error normalization, Copilot
//! routing, and the device-code flow end to end.

use axum::{Router, extract::State, http::StatusCode, routing::post};
use rai_client::provider::{Provider, StreamEvent};
use rai_client::{
    AnthropicProvider, CopilotProvider, GeminiProvider, OpenAiProvider, ProviderError,
};
use rai_core::{Message, Request};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn spawn_test_server(
    app: Router,
) -> Result<(String, AbortOnDrop), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let base_url = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    tokio::task::yield_now().await;
    Ok((base_url, AbortOnDrop(handle)))
}

fn user_request(text: &str) -> Request {
    Request {
        messages: vec![Message::user(text)],
        ..Default::default()
    }
}

async fn collect_events(
    provider: &dyn Provider,
    request: &Request,
) -> Result<Vec<StreamEvent>, ProviderError> {
    let mut rx = provider.stream(request).await?;
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    Ok(events)
}

fn collected_text(events: &[StreamEvent]) -> String {
    let mut text = String::new();
    for event in events {
        if let StreamEvent::Text(chunk) = event {
            text.push_str(chunk);
        }
    }
    text
}

#[tokio::test]
async fn test_openai_stream_happy_path() -> Result<(), Box<dyn std::error::Error>> {
    const SSE_BODY: &str = concat!(
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hello\"}\n\n",
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\" world\"}\n\n",
        "data: {\"type\":\"response.completed\"}\n",
    );

    let app = Router::new().route("/responses", post(|| async { (StatusCode::OK, SSE_BODY) }));
    let (base_url, _server) = spawn_test_server(app).await?;

    let provider = OpenAiProvider::new(base_url, "k", "gpt-4");
    let events = collect_events(&provider, &user_request("hi")).await?;

    assert_eq!(collected_text(&events), "Hello world");
    assert!(matches!(events.last(), Some(StreamEvent::Done)));
    Ok(())
}

#[tokio::test]
async fn test_openai_http_error_normalized() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new().route(
        "/responses",
        post(|| async { (StatusCode::UNAUTHORIZED, "unauthorized") }),
    );
    let (base_url, _server) = spawn_test_server(app).await?;

    let provider = OpenAiProvider::new(base_url, "bad-key", "gpt-4");
    let err = provider.stream(&user_request("hi")).await.unwrap_err();

    assert_eq!(err.status_code(), Some(401));
    assert_eq!(err.provider(), Some("openai"));
    assert!(err.to_string().contains("authentication failed"));
    Ok(())
}

#[tokio::test]
async fn test_openai_complete_parses_output_items() -> Result<(), Box<dyn std::error::Error>> {
    const BODY: &str = r#"{
        "id": "resp_1",
        "output": [
            {"type": "message", "content": [{"type": "text", "text": "The answer is 4."}]},
            {"type": "reasoning", "summary": [{"type": "text", "text": "2+2"}]}
        ]
    }"#;

    let app = Router::new().route("/responses", post(|| async { (StatusCode::OK, BODY) }));
    let (base_url, _server) = spawn_test_server(app).await?;

    let provider = OpenAiProvider::new(base_url, "k", "gpt-4");
    let response = provider.complete(&user_request("2+2?")).await?;

    assert_eq!(response.content, "The answer is 4.");
    assert_eq!(response.reasoning_summary, "2+2");
    assert!(response.tool_calls.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_anthropic_stream_tool_use() -> Result<(), Box<dyn std::error::Error>> {
    const SSE_BODY: &str = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
        "event: content_block_start\n",
        "data: {\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"tu_1\",\"name\":\"get_weather\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"city\\\":\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"Paris\\\"}\"}}\n\n",
        "event: content_block_stop\n",
        "data: {\"index\":0}\n\n",
        "event: message_stop\n",
        "data: {}\n",
    );

    let app = Router::new().route("/v1/messages", post(|| async { (StatusCode::OK, SSE_BODY) }));
    let (base_url, _server) = spawn_test_server(app).await?;

    let provider = AnthropicProvider::new(base_url, "k", "claude-sonnet-4");
    let events = collect_events(&provider, &user_request("weather in paris?")).await?;

    let mut tool_events = 0;
    for event in &events {
        if let StreamEvent::ToolCalls(calls) = event {
            tool_events += 1;
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].id, "tu_1");
            assert_eq!(calls[0].name, "get_weather");
            assert_eq!(calls[0].arguments, "{\"city\":\"Paris\"}");
        }
    }
    assert_eq!(tool_events, 1, "exactly one tool_calls event per block");
    assert!(matches!(events.last(), Some(StreamEvent::Done)));
    Ok(())
}

#[tokio::test]
async fn test_anthropic_stream_error_event() -> Result<(), Box<dyn std::error::Error>> {
    const SSE_BODY: &str = concat!(
        "event: error\n",
        "data: {\"error\":{\"message\":\"overloaded\"}}\n",
    );

    let app = Router::new().route("/v1/messages", post(|| async { (StatusCode::OK, SSE_BODY) }));
    let (base_url, _server) = spawn_test_server(app).await?;

    let provider = AnthropicProvider::new(base_url, "k", "claude-sonnet-4");
    let events = collect_events(&provider, &user_request("hi")).await?;

    match events.last() {
        Some(StreamEvent::Error(err)) => {
            assert_eq!(err.to_string(), "anthropic: overloaded");
        }
        other => panic!("expected error event, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_gemini_stream_array_decoding() -> Result<(), Box<dyn std::error::Error>> {
    const BODY: &str = concat!(
        "[{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello\"}]}}]},\n",
        "{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" Gemini\"}]}}]}]",
    );

    let app = Router::new().route(
        "/v1beta/models/{model}",
        post(|| async { (StatusCode::OK, BODY) }),
    );
    let (base_url, _server) = spawn_test_server(app).await?;

    let provider = GeminiProvider::new(base_url, "k", "gemini-2.0-flash");
    let events = collect_events(&provider, &user_request("hi")).await?;

    assert_eq!(collected_text(&events), "Hello Gemini");
    assert!(matches!(events.last(), Some(StreamEvent::Done)));
    Ok(())
}

#[tokio::test]
async fn test_gemini_stream_function_call() -> Result<(), Box<dyn std::error::Error>> {
    const BODY: &str = "[{\"candidates\":[{\"content\":{\"parts\":[{\"functionCall\":{\"name\":\"get_weather\",\"args\":{\"city\":\"Tokyo\"}}}]}}]}]";

    let app = Router::new().route(
        "/v1beta/models/{model}",
        post(|| async { (StatusCode::OK, BODY) }),
    );
    let (base_url, _server) = spawn_test_server(app).await?;

    let provider = GeminiProvider::new(base_url, "k", "gemini-2.0-flash");
    let events = collect_events(&provider, &user_request("weather?")).await?;

    let StreamEvent::ToolCalls(calls) = &events[0] else {
        panic!("expected tool calls, got {:?}", events[0]);
    };
    assert_eq!(calls[0].name, "get_weather");
    assert_eq!(calls[0].arguments, "{\"city\":\"Tokyo\"}");
    Ok(())
}

#[derive(Clone, Default)]
struct RouteHits {
    chat: Arc<AtomicUsize>,
    responses: Arc<AtomicUsize>,
}

fn copilot_router(hits: RouteHits) -> Router {
    const CHAT_SSE: &str = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"chat\"}}]}\n\n",
        "data: [DONE]\n",
    );
    const RESPONSES_SSE: &str = concat!(
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\"responses\"}\n\n",
        "data: {\"type\":\"response.completed\"}\n",
    );

    Router::new()
        .route(
            "/chat/completions",
            post(|State(hits): State<RouteHits>| async move {
                hits.chat.fetch_add(1, Ordering::SeqCst);
                (StatusCode::OK, CHAT_SSE)
            }),
        )
        .route(
            "/responses",
            post(|State(hits): State<RouteHits>| async move {
                hits.responses.fetch_add(1, Ordering::SeqCst);
                (StatusCode::OK, RESPONSES_SSE)
            }),
        )
        .with_state(hits)
}

#[tokio::test]
async fn test_copilot_routing_gpt5_uses_responses() -> Result<(), Box<dyn std::error::Error>> {
    let hits = RouteHits::default();
    let (base_url, _server) = spawn_test_server(copilot_router(hits.clone())).await?;

    let provider = CopilotProvider::new(base_url, "tok", "gpt-5");
    let events = collect_events(&provider, &user_request("hi")).await?;

    assert_eq!(collected_text(&events), "responses");
    assert_eq!(hits.responses.load(Ordering::SeqCst), 1);
    assert_eq!(hits.chat.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_copilot_routing_gpt5_mini_uses_chat() -> Result<(), Box<dyn std::error::Error>> {
    let hits = RouteHits::default();
    let (base_url, _server) = spawn_test_server(copilot_router(hits.clone())).await?;

    let provider = CopilotProvider::new(base_url, "tok", "gpt-5-mini");
    let events = collect_events(&provider, &user_request("hi")).await?;

    assert_eq!(collected_text(&events), "chat");
    assert_eq!(hits.chat.load(Ordering::SeqCst), 1);
    assert_eq!(hits.responses.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_copilot_model_not_available() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new().route(
        "/chat/completions",
        post(|| async { (StatusCode::FORBIDDEN, "model xyz is not supported") }),
    );
    let (base_url, _server) = spawn_test_server(app).await?;

    let provider = CopilotProvider::new(base_url, "tok", "claude-sonnet-4");
    let err = provider.stream(&user_request("hi")).await.unwrap_err();

    assert_eq!(err.status_code(), Some(403));
    assert!(err.to_string().contains("model not available"));
    Ok(())
}

#[tokio::test]
async fn test_device_flow_pending_then_token() -> Result<(), Box<dyn std::error::Error>> {
    let polls = Arc::new(AtomicUsize::new(0));
    let polls_state = polls.clone();

    let app = Router::new()
        .route(
            "/login/device/code",
            post(|| async {
                (
                    StatusCode::OK,
                    r#"{"device_code":"dev123","user_code":"ABCD-1234","verification_uri":"","interval":1}"#,
                )
            }),
        )
        .route(
            "/login/oauth/access_token",
            post(move || {
                let polls = polls_state.clone();
                async move {
                    let n = polls.fetch_add(1, Ordering::SeqCst);
                    let body = match n {
                        0 => r#"{"error":"authorization_pending"}"#,
                        1 => r#"{"error":"slow_down","interval":1}"#,
                        _ => r#"{"access_token":"gho_live"}"#,
                    };
                    (StatusCode::OK, body)
                }
            }),
        );
    let (base_url, _server) = spawn_test_server(app).await?;

    let mut out: Vec<u8> = Vec::new();
    let cancel = CancellationToken::new();
    let auth = rai_client::copilot_auth::device_auth_with_endpoints(
        &format!("{base_url}/login/device/code"),
        &format!("{base_url}/login/oauth/access_token"),
        "github.com",
        &mut out,
        &cancel,
    )
    .await?;

    assert_eq!(auth.token, "gho_live");
    assert_eq!(auth.enterprise_url, "github.com");
    assert_eq!(polls.load(Ordering::SeqCst), 3);

    let printed = String::from_utf8(out)?;
    assert!(printed.contains("enter code: ABCD-1234"));
    assert!(printed.contains("Waiting for authentication..."));
    Ok(())
}

#[tokio::test]
async fn test_device_flow_denied() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new()
        .route(
            "/login/device/code",
            post(|| async {
                (
                    StatusCode::OK,
                    r#"{"device_code":"dev123","user_code":"ABCD-1234","verification_uri":"","interval":1}"#,
                )
            }),
        )
        .route(
            "/login/oauth/access_token",
            post(|| async { (StatusCode::OK, r#"{"error":"access_denied"}"#) }),
        );
    let (base_url, _server) = spawn_test_server(app).await?;

    let mut out: Vec<u8> = Vec::new();
    let cancel = CancellationToken::new();
    let err = rai_client::copilot_auth::device_auth_with_endpoints(
        &format!("{base_url}/login/device/code"),
        &format!("{base_url}/login/oauth/access_token"),
        "github.com",
        &mut out,
        &cancel,
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "authentication failed: access_denied");
    Ok(())
}

#[tokio::test]
async fn test_device_flow_cancellation() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new()
        .route(
            "/login/device/code",
            post(|| async {
                (
                    StatusCode::OK,
                    r#"{"device_code":"dev123","user_code":"ABCD-1234","verification_uri":"","interval":30}"#,
                )
            }),
        )
        .route(
            "/login/oauth/access_token",
            post(|| async { (StatusCode::OK, r#"{"error":"authorization_pending"}"#) }),
        );
    let (base_url, _server) = spawn_test_server(app).await?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel_clone.cancel();
    });

    let mut out: Vec<u8> = Vec::new();
    let err = rai_client::copilot_auth::device_auth_with_endpoints(
        &format!("{base_url}/login/device/code"),
        &format!("{base_url}/login/oauth/access_token"),
        "github.com",
        &mut out,
        &cancel,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ProviderError::Cancelled));
    Ok(())
}
