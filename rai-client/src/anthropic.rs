//! Anthropic Messages API adapter.
//!
//! Speaks `/v1/messages` with named-event SSE. Tool-use blocks arrive as
//! a `content_block_start` followed by `input_json_delta` fragments; the
//! parser accumulates partial JSON per block index and emits one
//! completed tool call at `content_block_stop`.

use crate::debug::DebugCapture;
use crate::error::ProviderError;
use crate::provider::{Provider, STREAM_CHANNEL_CAPACITY, StreamEvent};
use crate::sse::{self, LineOutcome, SseLineBuffer};
use async_trait::async_trait;
use futures::StreamExt;
use rai_core::{Message, Request, Response, ToolCall};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Anthropic requires max_tokens on every request.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Adapter for Anthropic's Messages API.
#[derive(Debug)]
pub struct AnthropicProvider {
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    http: reqwest::Client,
    debug: DebugCapture,
}

impl AnthropicProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            http: reqwest::Client::new(),
            debug: DebugCapture::disabled(),
        }
    }

    pub fn with_limits(mut self, max_tokens: Option<u32>, temperature: Option<f64>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_debug(mut self, debug: DebugCapture) -> Self {
        self.debug = debug;
        self
    }

    fn url(&self) -> String {
        format!("{}/v1/messages", self.endpoint.trim_end_matches('/'))
    }

    fn build_request_body(&self, request: &Request, stream: bool) -> Value {
        let mut system = None;
        let mut messages = Vec::new();

        for msg in &request.messages {
            if let Message::System { content } = msg {
                system = Some(content.clone());
                continue;
            }
            messages.push(serde_json::json!({
                "role": msg.role(),
                "content": msg.content(),
            }));
        }

        // The API rejects an empty messages array.
        if messages.is_empty() {
            messages.push(serde_json::json!({"role": "user", "content": ""}));
        }

        let max_tokens = request
            .max_tokens
            .or(self.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "max_tokens": max_tokens,
            "messages": messages,
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }
        if let Some(temp) = request.temperature.or(self.temperature) {
            if let Some(num) = serde_json::Number::from_f64(temp) {
                body["temperature"] = Value::Number(num);
            }
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, request: &Request) -> Result<Response, ProviderError> {
        let body = self.build_request_body(request, false);
        let url = self.url();
        self.debug.request("anthropic", "POST", &url, &body);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "anthropic",
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "anthropic",
                message: format!("reading response: {err}"),
            })?;
        self.debug.response("anthropic", status, &text);

        if !(200..300).contains(&status) {
            return Err(ProviderError::from_http_status("anthropic", status, &text));
        }

        let parsed: MessagesBody =
            serde_json::from_str(&text).map_err(|err| ProviderError::Transport {
                provider: "anthropic",
                message: format!("decoding response: {err}"),
            })?;
        if let Some(error) = parsed.error {
            return Err(ProviderError::Api {
                provider: "anthropic",
                message: error.message,
            });
        }

        let mut result = Response::default();
        for block in parsed.content {
            match block.block_type.as_str() {
                "text" => result.content.push_str(&block.text),
                "tool_use" => {
                    let input = block.input.unwrap_or(Value::Null);
                    result
                        .tool_calls
                        .push(ToolCall::new(block.id, block.name, input.to_string()));
                }
                _ => {}
            }
        }
        Ok(result)
    }

    async fn stream(
        &self,
        request: &Request,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        let body = self.build_request_body(request, true);
        let url = self.url();
        self.debug.request("anthropic", "POST", &url, &body);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "anthropic",
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            self.debug.response("anthropic", status, &text);
            return Err(ProviderError::from_http_status("anthropic", status, &text));
        }
        self.debug.response_streaming("anthropic", status);

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(read_messages_sse(response, tx));
        Ok(rx)
    }
}

async fn read_messages_sse(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut stream = response.bytes_stream();
    let mut lines = SseLineBuffer::new();
    let mut parser = MessagesSseParser::new();

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                lines.push(&chunk);
                while let Some(line) = lines.next_line() {
                    if parser.handle_line(&line, &tx).await == LineOutcome::Finished {
                        return;
                    }
                }
            }
            Some(Err(err)) => {
                let _ = tx
                    .send(StreamEvent::Error(ProviderError::Stream(err.to_string())))
                    .await;
                return;
            }
            None => break,
        }
    }

    if let Some(line) = lines.take_remainder() {
        let _ = parser.handle_line(&line, &tx).await;
    }
}

/// State machine over named SSE events, keyed by the last `event:` line.
struct MessagesSseParser {
    current_event: String,
    tool_blocks: BTreeMap<u64, ToolUseBlock>,
}

struct ToolUseBlock {
    id: String,
    name: String,
    json: String,
}

impl MessagesSseParser {
    fn new() -> Self {
        Self {
            current_event: String::new(),
            tool_blocks: BTreeMap::new(),
        }
    }

    async fn handle_line(&mut self, line: &str, tx: &mpsc::Sender<StreamEvent>) -> LineOutcome {
        if let Some(event) = sse::strip_event_prefix(line) {
            self.current_event = event.to_string();
            return LineOutcome::Continue;
        }
        let Some(payload) = sse::strip_data_prefix(line) else {
            return LineOutcome::Continue;
        };

        match self.current_event.as_str() {
            "content_block_delta" => {
                let Ok(event) = serde_json::from_str::<BlockDeltaEvent>(payload) else {
                    return LineOutcome::Continue;
                };
                let Some(delta) = event.delta else {
                    return LineOutcome::Continue;
                };
                match delta.delta_type.as_str() {
                    "text_delta" => {
                        if !delta.text.is_empty()
                            && tx.send(StreamEvent::Text(delta.text)).await.is_err()
                        {
                            return LineOutcome::Finished;
                        }
                    }
                    "input_json_delta" => {
                        if let Some(block) = self.tool_blocks.get_mut(&event.index) {
                            block.json.push_str(&delta.partial_json);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_start" => {
                let Ok(event) = serde_json::from_str::<BlockStartEvent>(payload) else {
                    return LineOutcome::Continue;
                };
                if let Some(block) = event.content_block {
                    if block.block_type == "tool_use" {
                        // A repeated start for an index resets its buffer.
                        self.tool_blocks.insert(
                            event.index,
                            ToolUseBlock {
                                id: block.id,
                                name: block.name,
                                json: String::new(),
                            },
                        );
                    }
                }
            }
            "content_block_stop" => {
                let Ok(event) = serde_json::from_str::<BlockStopEvent>(payload) else {
                    return LineOutcome::Continue;
                };
                if let Some(block) = self.tool_blocks.remove(&event.index) {
                    let arguments = if block.json.is_empty() {
                        "{}".to_string()
                    } else {
                        block.json
                    };
                    let call = ToolCall::new(block.id, block.name, arguments);
                    if tx.send(StreamEvent::ToolCalls(vec![call])).await.is_err() {
                        return LineOutcome::Finished;
                    }
                }
            }
            "message_stop" => {
                let _ = tx.send(StreamEvent::Done).await;
                return LineOutcome::Finished;
            }
            "error" => {
                let message = serde_json::from_str::<ErrorEvent>(payload)
                    .ok()
                    .and_then(|e| e.error)
                    .map(|e| e.message)
                    .unwrap_or_default();
                let _ = tx
                    .send(StreamEvent::Error(ProviderError::Stream(format!(
                        "anthropic: {message}"
                    ))))
                    .await;
                return LineOutcome::Finished;
            }
            _ => {}
        }
        LineOutcome::Continue
    }
}

#[derive(Debug, Deserialize)]
struct MessagesBody {
    #[serde(default)]
    content: Vec<MessagesContentBlock>,
    #[serde(default)]
    error: Option<MessagesApiError>,
}

#[derive(Debug, Deserialize)]
struct MessagesContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct MessagesApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct BlockDeltaEvent {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    delta: Option<BlockDelta>,
}

#[derive(Debug, Deserialize)]
struct BlockDelta {
    #[serde(rename = "type", default)]
    delta_type: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    partial_json: String,
}

#[derive(Debug, Deserialize)]
struct BlockStartEvent {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    content_block: Option<BlockStartBody>,
}

#[derive(Debug, Deserialize)]
struct BlockStartBody {
    #[serde(rename = "type", default)]
    block_type: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct BlockStopEvent {
    #[serde(default)]
    index: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rai_core::ToolDef;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new("https://api.anthropic.com", "key", "claude-sonnet-4")
    }

    #[test]
    fn test_build_body_extracts_system_and_defaults_max_tokens() {
        let request = Request {
            messages: vec![Message::system("be terse"), Message::user("hi")],
            ..Default::default()
        };
        let body = provider().build_request_body(&request, true);

        assert_eq!(body["system"], "be terse");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_build_body_tools_use_input_schema() {
        let request = Request {
            messages: vec![Message::user("hi")],
            tools: vec![ToolDef {
                name: "terminal".to_string(),
                description: "Run a command".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            ..Default::default()
        };
        let body = provider().build_request_body(&request, false);
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_build_body_empty_messages_gets_placeholder() {
        let body = provider().build_request_body(&Request::default(), false);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "");
    }

    async fn drive(lines: &[&str]) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let mut parser = MessagesSseParser::new();
        for line in lines {
            if parser.handle_line(line, &tx).await == LineOutcome::Finished {
                break;
            }
        }
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_parser_text_then_stop() {
        let events = drive(&[
            "event: content_block_delta",
            "data: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}",
            "event: message_stop",
            "data: {}",
        ])
        .await;

        assert!(matches!(&events[0], StreamEvent::Text(t) if t == "Hello"));
        assert!(matches!(&events[1], StreamEvent::Done));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_parser_tool_use_accumulation() {
        let events = drive(&[
            "event: content_block_start",
            "data: {\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"tu_1\",\"name\":\"get_weather\"}}",
            "event: content_block_delta",
            "data: {\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"city\\\":\"}}",
            "event: content_block_delta",
            "data: {\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"Paris\\\"}\"}}",
            "event: content_block_stop",
            "data: {\"index\":1}",
            "event: message_stop",
            "data: {}",
        ])
        .await;

        let StreamEvent::ToolCalls(calls) = &events[0] else {
            panic!("expected tool calls, got {:?}", events[0]);
        };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "tu_1");
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].arguments, "{\"city\":\"Paris\"}");
        assert!(matches!(&events[1], StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_parser_tool_use_empty_input_becomes_empty_object() {
        let events = drive(&[
            "event: content_block_start",
            "data: {\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"tu_2\",\"name\":\"noop\"}}",
            "event: content_block_stop",
            "data: {\"index\":0}",
        ])
        .await;

        let StreamEvent::ToolCalls(calls) = &events[0] else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].arguments, "{}");
    }

    #[tokio::test]
    async fn test_parser_error_event() {
        let events = drive(&[
            "event: error",
            "data: {\"error\":{\"message\":\"overloaded\"}}",
        ])
        .await;

        match &events[0] {
            StreamEvent::Error(err) => {
                assert_eq!(err.to_string(), "anthropic: overloaded");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parser_ignores_unknown_events() {
        let events = drive(&[
            "event: message_start",
            "data: {\"message\":{\"usage\":{\"input_tokens\":3}}}",
            "event: ping",
            "data: {}",
        ])
        .await;
        assert!(events.is_empty());
    }
}
