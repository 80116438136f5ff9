//! GitHub Copilot adapter.
//!
//! Copilot exposes two wire formats behind one base URL: the Chat
//! Completions API and the newer Responses API. The model ID decides the
//! route; request construction for the Responses path is shared with the
//! OpenAI adapter since the formats are identical.

use crate::debug::DebugCapture;
use crate::error::ProviderError;
use crate::openai::{
    ResponsesBody, build_responses_body, parse_responses_output, read_responses_sse,
};
use crate::provider::{Provider, STREAM_CHANNEL_CAPACITY, StreamEvent};
use crate::sse::{self, LineOutcome, SseLineBuffer};
use async_trait::async_trait;
use futures::StreamExt;
use rai_core::{Message, Request, Response, ToolCall};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Returns true for GPT-5+ models except `gpt-5-mini`.
///
/// Copilot exposes the Responses protocol only for newer GPT-5+
/// variants; `gpt-5-mini` and everything else (Claude, Gemini, O-series,
/// GPT-4) stay on the Chat API. The decision is pure and depends only on
/// the model ID.
pub fn should_use_responses_api(model_id: &str) -> bool {
    let Some(rest) = model_id.strip_prefix("gpt-") else {
        return false;
    };
    let digits: &str = {
        let end = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        &rest[..end]
    };
    let Ok(version) = digits.parse::<u32>() else {
        return false;
    };
    version >= 5 && !model_id.starts_with("gpt-5-mini")
}

/// Adapter for GitHub Copilot (github.com and Enterprise).
#[derive(Debug)]
pub struct CopilotProvider {
    base_url: String,
    token: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    http: reqwest::Client,
    debug: DebugCapture,
}

impl CopilotProvider {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
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

    fn resolved_model<'a>(&'a self, request: &'a Request) -> &'a str {
        request.model.as_deref().unwrap_or(&self.model)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    fn apply_headers(
        &self,
        builder: reqwest::RequestBuilder,
        request: &Request,
    ) -> reqwest::RequestBuilder {
        let initiator = match request.messages.last() {
            Some(Message::User { .. }) => "user",
            _ => "agent",
        };
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", concat!("rai/", env!("CARGO_PKG_VERSION")))
            .header("Openai-Intent", "conversation-edits")
            .header("x-initiator", initiator)
    }

    fn build_chat_body(&self, request: &Request, stream: bool) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role(), "content": m.content()}))
            .collect();

        let mut body = serde_json::json!({
            "model": self.resolved_model(request),
            "messages": messages,
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }
        if let Some(max) = request.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = Value::from(max);
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

    async fn send(
        &self,
        url: &str,
        body: &Value,
        request: &Request,
    ) -> Result<reqwest::Response, ProviderError> {
        self.debug.request("github-copilot", "POST", url, body);
        self.apply_headers(self.http.post(url), request)
            .json(body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "github-copilot",
                message: err.to_string(),
            })
    }

    async fn complete_chat(&self, request: &Request) -> Result<Response, ProviderError> {
        let body = self.build_chat_body(request, false);
        let url = self.api_url("/chat/completions");
        let response = self.send(&url, &body, request).await?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "github-copilot",
                message: format!("reading response: {err}"),
            })?;
        self.debug.response("github-copilot", status, &text);

        if !(200..300).contains(&status) {
            return Err(ProviderError::from_copilot_status(status, &text));
        }

        let parsed: ChatBody =
            serde_json::from_str(&text).map_err(|err| ProviderError::Transport {
                provider: "github-copilot",
                message: format!("decoding response: {err}"),
            })?;
        if let Some(error) = parsed.error {
            return Err(ProviderError::Api {
                provider: "github-copilot",
                message: error.message,
            });
        }

        let mut result = Response::default();
        if let Some(choice) = parsed.choices.into_iter().next() {
            result.content = choice.message.content;
            for call in choice.message.tool_calls {
                result.tool_calls.push(ToolCall::new(
                    call.id,
                    call.function.name,
                    call.function.arguments,
                ));
            }
        }
        Ok(result)
    }

    async fn complete_responses(&self, request: &Request) -> Result<Response, ProviderError> {
        let body = build_responses_body(
            self.resolved_model(request),
            request,
            false,
            self.max_tokens,
            self.temperature,
        );
        let url = self.api_url("/responses");
        let response = self.send(&url, &body, request).await?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "github-copilot",
                message: format!("reading response: {err}"),
            })?;
        self.debug.response("github-copilot", status, &text);

        if !(200..300).contains(&status) {
            return Err(ProviderError::from_copilot_status(status, &text));
        }

        let parsed: ResponsesBody =
            serde_json::from_str(&text).map_err(|err| ProviderError::Transport {
                provider: "github-copilot",
                message: format!("decoding response: {err}"),
            })?;
        Ok(parse_responses_output(&parsed))
    }

    async fn stream_chat(
        &self,
        request: &Request,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        let body = self.build_chat_body(request, true);
        let url = self.api_url("/chat/completions");
        let response = self.send(&url, &body, request).await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            self.debug.response("github-copilot", status, &text);
            return Err(ProviderError::from_copilot_status(status, &text));
        }
        self.debug.response_streaming("github-copilot", status);

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(read_chat_sse(response, tx));
        Ok(rx)
    }

    async fn stream_responses(
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
        let url = self.api_url("/responses");
        let response = self.send(&url, &body, request).await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            self.debug.response("github-copilot", status, &text);
            return Err(ProviderError::from_copilot_status(status, &text));
        }
        self.debug.response_streaming("github-copilot", status);

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(read_responses_sse(response, tx));
        Ok(rx)
    }
}

#[async_trait]
impl Provider for CopilotProvider {
    fn name(&self) -> &'static str {
        "github-copilot"
    }

    async fn complete(&self, request: &Request) -> Result<Response, ProviderError> {
        if should_use_responses_api(self.resolved_model(request)) {
            self.complete_responses(request).await
        } else {
            self.complete_chat(request).await
        }
    }

    async fn stream(
        &self,
        request: &Request,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        if should_use_responses_api(self.resolved_model(request)) {
            self.stream_responses(request).await
        } else {
            self.stream_chat(request).await
        }
    }
}

async fn read_chat_sse(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut stream = response.bytes_stream();
    let mut lines = SseLineBuffer::new();
    let mut parser = ChatSseParser::new();

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

/// Accumulates chat tool-call deltas by index until a finish_reason or
/// `[DONE]` flushes them as one event.
struct ChatSseParser {
    tool_calls: BTreeMap<u64, ChatToolAcc>,
}

#[derive(Default)]
struct ChatToolAcc {
    id: String,
    name: String,
    args: String,
}

impl ChatSseParser {
    fn new() -> Self {
        Self {
            tool_calls: BTreeMap::new(),
        }
    }

    async fn handle_line(&mut self, line: &str, tx: &mpsc::Sender<StreamEvent>) -> LineOutcome {
        let Some(payload) = sse::strip_data_prefix(line) else {
            return LineOutcome::Continue;
        };
        if payload == "[DONE]" {
            if self.flush(tx).await.is_err() {
                return LineOutcome::Finished;
            }
            let _ = tx.send(StreamEvent::Done).await;
            return LineOutcome::Finished;
        }
        let Ok(chunk) = serde_json::from_str::<ChatChunk>(payload) else {
            return LineOutcome::Continue;
        };
        let Some(choice) = chunk.choices.into_iter().next() else {
            return LineOutcome::Continue;
        };

        if !choice.delta.content.is_empty()
            && tx
                .send(StreamEvent::Text(choice.delta.content))
                .await
                .is_err()
        {
            return LineOutcome::Finished;
        }

        for delta in choice.delta.tool_calls {
            let acc = self.tool_calls.entry(delta.index).or_default();
            // Retain the first non-empty id and name; arguments append.
            if acc.id.is_empty() {
                acc.id = delta.id;
            }
            if acc.name.is_empty() {
                acc.name = delta.function.name;
            }
            acc.args.push_str(&delta.function.arguments);
        }

        if let Some(reason) = choice.finish_reason.as_deref() {
            if (reason == "tool_calls" || reason == "stop")
                && !self.tool_calls.is_empty()
                && self.flush(tx).await.is_err()
            {
                return LineOutcome::Finished;
            }
        }
        LineOutcome::Continue
    }

    async fn flush(&mut self, tx: &mpsc::Sender<StreamEvent>) -> Result<(), ()> {
        let accumulated = std::mem::take(&mut self.tool_calls);
        let calls: Vec<ToolCall> = accumulated
            .into_values()
            .filter(|acc| !acc.name.is_empty())
            .map(|acc| ToolCall::new(acc.id, acc.name, acc.args))
            .collect();
        if calls.is_empty() {
            return Ok(());
        }
        tx.send(StreamEvent::ToolCalls(calls))
            .await
            .map_err(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ChatApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: ChatMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ChatMessageToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageToolCall {
    #[serde(default)]
    id: String,
    #[serde(default)]
    function: ChatFunction,
}

#[derive(Debug, Default, Deserialize)]
struct ChatFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChunkChoice {
    #[serde(default)]
    delta: ChatDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ChatToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCallDelta {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    id: String,
    #[serde(default)]
    function: ChatFunction,
}
