//! OpenAI-compatible Responses API adapter.
//!
//! Speaks the `/responses` wire format. The request/response lowering and
//! SSE parsing live in crate-visible helpers because the Copilot adapter
//! reuses this exact wire format for its Responses path.

use crate::debug::DebugCapture;
use crate::error::ProviderError;
use crate::provider::{Provider, STREAM_CHANNEL_CAPACITY, StreamEvent};
use crate::sse::{self, LineOutcome, SseLineBuffer};
use async_trait::async_trait;
use futures::StreamExt;
use rai_core::{Message, Request, Response, ToolCall};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Adapter for OpenAI-compatible Responses APIs.
#[derive(Debug)]
pub struct OpenAiProvider {
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    http: reqwest::Client,
    debug: DebugCapture,
}

impl OpenAiProvider {
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

    /// Default token/temperature limits applied when a request leaves
    /// them unset.
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
        format!("{}/responses", self.endpoint.trim_end_matches('/'))
    }

    fn resolved_model<'a>(&'a self, request: &'a Request) -> &'a str {
        request.model.as_deref().unwrap_or(&self.model)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &Request) -> Result<Response, ProviderError> {
        let body = build_responses_body(
            self.resolved_model(request),
            request,
            false,
            self.max_tokens,
            self.temperature,
        );
        let url = self.url();
        self.debug.request("openai", "POST", &url, &body);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "openai",
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "openai",
                message: format!("reading response: {err}"),
            })?;
        self.debug.response("openai", status, &text);

        if !(200..300).contains(&status) {
            return Err(ProviderError::from_http_status("openai", status, &text));
        }

        let parsed: ResponsesBody =
            serde_json::from_str(&text).map_err(|err| ProviderError::Transport {
                provider: "openai",
                message: format!("decoding response: {err}"),
            })?;
        if let Some(error) = parsed.error {
            return Err(ProviderError::Api {
                provider: "openai",
                message: error.message,
            });
        }

        Ok(parse_responses_output(&parsed))
    }

    async fn stream(
        &self,
        request: &Request,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        let body = build_responses_body(
            self.resolved_model(request),
            request,
            true,
            self.max_tokens,
            self.temperature,
        );
        let url = self.url();
        self.debug.request("openai", "POST", &url, &body);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "openai",
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            self.debug.response("openai", status, &text);
            return Err(ProviderError::from_http_status("openai", status, &text));
        }
        self.debug.response_streaming("openai", status);

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(read_responses_sse(response, tx));
        Ok(rx)
    }
}

/// Build a Responses API request body.
///
/// Shared with the Copilot Responses path, which differs only in base
/// URL and headers.
pub(crate) fn build_responses_body(
    model: &str,
    request: &Request,
    stream: bool,
    default_max_tokens: Option<u32>,
    default_temperature: Option<f64>,
) -> Value {
    let mut input = Vec::with_capacity(request.messages.len());
    for msg in &request.messages {
        let mut item = serde_json::json!({
            "role": msg.role(),
            "content": msg.content(),
        });
        if let Message::Tool {
            tool_call_id: Some(id),
            ..
        } = msg
        {
            item["tool_call_id"] = Value::String(id.clone());
        }
        input.push(item);
    }

    let mut body = serde_json::json!({
        "model": model,
        "input": input,
    });
    if stream {
        body["stream"] = Value::Bool(true);
    }
    if let Some(max) = request.max_tokens.or(default_max_tokens) {
        body["max_output_tokens"] = Value::from(max);
    }
    if let Some(temp) = request.temperature.or(default_temperature) {
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
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
    }
    body
}

/// Non-streaming Responses body.
#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesBody {
    #[serde(default)]
    pub output: Vec<ResponsesOutputItem>,
    #[serde(default)]
    pub error: Option<ResponsesApiError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesOutputItem {
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub content: Vec<ResponsesTextPart>,
    #[serde(default)]
    pub summary: Vec<ResponsesTextPart>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub call_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesTextPart {
    #[serde(rename = "type", default)]
    pub part_type: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesApiError {
    #[serde(default)]
    pub message: String,
}

/// Assemble a [`Response`] from Responses API output items.
pub(crate) fn parse_responses_output(body: &ResponsesBody) -> Response {
    let mut result = Response::default();
    for item in &body.output {
        match item.item_type.as_str() {
            "message" => {
                for part in &item.content {
                    if part.part_type == "text" {
                        result.content.push_str(&part.text);
                    }
                }
            }
            "reasoning" | "reasoning_summary" => {
                for part in &item.summary {
                    if part.part_type == "text" {
                        result.reasoning_summary.push_str(&part.text);
                    }
                }
            }
            "function_call" => {
                result.tool_calls.push(ToolCall::new(
                    item.call_id.clone(),
                    item.name.clone(),
                    item.arguments.clone(),
                ));
            }
            _ => {}
        }
    }
    result
}

/// Streaming SSE event from the Responses API.
#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesStreamEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub delta: String,
    #[serde(default)]
    pub item: Option<ResponsesStreamItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesStreamItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub call_id: String,
}

/// Producer task: parse Responses SSE from the body into the channel.
pub(crate) async fn read_responses_sse(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut stream = response.bytes_stream();
    let mut lines = SseLineBuffer::new();

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                lines.push(&chunk);
                while let Some(line) = lines.next_line() {
                    if handle_responses_line(&line, &tx).await == LineOutcome::Finished {
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
        let _ = handle_responses_line(&line, &tx).await;
    }
}

async fn handle_responses_line(line: &str, tx: &mpsc::Sender<StreamEvent>) -> LineOutcome {
    let Some(payload) = sse::strip_data_prefix(line) else {
        return LineOutcome::Continue;
    };
    if payload == "[DONE]" {
        let _ = tx.send(StreamEvent::Done).await;
        return LineOutcome::Finished;
    }
    // Malformed events are skipped.
    let Ok(event) = serde_json::from_str::<ResponsesStreamEvent>(payload) else {
        return LineOutcome::Continue;
    };

    match event.event_type.as_str() {
        "response.output_text.delta" => {
            if !event.delta.is_empty()
                && tx.send(StreamEvent::Text(event.delta)).await.is_err()
            {
                return LineOutcome::Finished;
            }
        }
        "response.reasoning_summary_text.delta" => {
            if !event.delta.is_empty()
                && tx.send(StreamEvent::Reasoning(event.delta)).await.is_err()
            {
                return LineOutcome::Finished;
            }
        }
        "response.function_call_arguments.done" => {
            if let Some(item) = event.item {
                let call = ToolCall::new(item.call_id, item.name, item.arguments);
                if tx.send(StreamEvent::ToolCalls(vec![call])).await.is_err() {
                    return LineOutcome::Finished;
                }
            }
        }
        "response.completed" => {
            let _ = tx.send(StreamEvent::Done).await;
            return LineOutcome::Finished;
        }
        _ => {}
    }
    LineOutcome::Continue
}
