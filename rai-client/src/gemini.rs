//! Google Gemini `generateContent` adapter.
//!
//! The streaming endpoint returns a JSON array whose elements are full
//! `generateContent` responses. serde_json has no async pull decoder, so
//! an incremental element scanner reassembles complete array elements
//! across arbitrary chunk boundaries.

use crate::debug::DebugCapture;
use crate::error::ProviderError;
use crate::provider::{Provider, STREAM_CHANNEL_CAPACITY, StreamEvent};
use async_trait::async_trait;
use futures::StreamExt;
use rai_core::{Message, Request, Response, ToolCall};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Adapter for Google's Gemini API.
#[derive(Debug)]
pub struct GeminiProvider {
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    http: reqwest::Client,
    debug: DebugCapture,
}

impl GeminiProvider {
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

    fn url(&self, request: &Request, stream: bool) -> String {
        let base = self.endpoint.trim_end_matches('/');
        let model = request.model.as_deref().unwrap_or(&self.model);
        if stream {
            format!(
                "{base}/v1beta/models/{model}:streamGenerateContent?alt=sse&key={}",
                self.api_key
            )
        } else {
            format!("{base}/v1beta/models/{model}:generateContent?key={}", self.api_key)
        }
    }

    fn build_request_body(&self, request: &Request) -> Value {
        let mut system_instruction = None;
        let mut contents = Vec::new();

        for msg in &request.messages {
            if let Message::System { content } = msg {
                system_instruction = Some(serde_json::json!({
                    "parts": [{"text": content}],
                }));
                continue;
            }
            // Gemini uses "model" instead of "assistant".
            let role = match msg {
                Message::Assistant { .. } => "model",
                other => other.role(),
            };
            contents.push(serde_json::json!({
                "role": role,
                "parts": [{"text": msg.content()}],
            }));
        }

        let mut body = serde_json::json!({ "contents": contents });
        if let Some(system) = system_instruction {
            body["systemInstruction"] = system;
        }

        let max_tokens = request.max_tokens.or(self.max_tokens);
        let temperature = request.temperature.or(self.temperature);
        if max_tokens.is_some() || temperature.is_some() {
            let mut config = serde_json::Map::new();
            if let Some(max) = max_tokens {
                config.insert("maxOutputTokens".to_string(), Value::from(max));
            }
            if let Some(temp) = temperature {
                if let Some(num) = serde_json::Number::from_f64(temp) {
                    config.insert("temperature".to_string(), Value::Number(num));
                }
            }
            body["generationConfig"] = Value::Object(config);
        }

        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = serde_json::json!([{"functionDeclarations": declarations}]);
        }

        body
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn complete(&self, request: &Request) -> Result<Response, ProviderError> {
        let body = self.build_request_body(request);
        let url = self.url(request, false);
        self.debug.request("google", "POST", &url, &body);

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "google",
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "google",
                message: format!("reading response: {err}"),
            })?;
        self.debug.response("google", status, &text);

        if !(200..300).contains(&status) {
            return Err(ProviderError::from_http_status("google", status, &text));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|err| ProviderError::Transport {
                provider: "google",
                message: format!("decoding response: {err}"),
            })?;
        if let Some(error) = parsed.error {
            return Err(ProviderError::Api {
                provider: "google",
                message: error.message,
            });
        }

        let mut tool_index = 0usize;
        Ok(parse_chunk(&parsed, &mut tool_index))
    }

    async fn stream(
        &self,
        request: &Request,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        let body = self.build_request_body(request);
        let url = self.url(request, true);
        self.debug.request("google", "POST", &url, &body);

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: "google",
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            self.debug.response("google", status, &text);
            return Err(ProviderError::from_http_status("google", status, &text));
        }
        self.debug.response_streaming("google", status);

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(read_stream(response, tx));
        Ok(rx)
    }
}

/// Producer task: decode array elements into stream events.
async fn read_stream(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut stream = response.bytes_stream();
    let mut decoder = JsonArrayDecoder::new();
    let mut tool_index = 0usize;

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                decoder.push(&String::from_utf8_lossy(&chunk));
                loop {
                    match decoder.next_element() {
                        Ok(Some(element)) => {
                            if !emit_element(&element, &tx, &mut tool_index).await {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(message) => {
                            let _ = tx
                                .send(StreamEvent::Error(ProviderError::Stream(message)))
                                .await;
                            return;
                        }
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

    let _ = tx.send(StreamEvent::Done).await;
}

/// Lower one decoded element into events. Returns false when the stream
/// must stop (error emitted or receiver gone).
async fn emit_element(
    element: &str,
    tx: &mpsc::Sender<StreamEvent>,
    tool_index: &mut usize,
) -> bool {
    let chunk = match serde_json::from_str::<GenerateContentResponse>(element) {
        Ok(chunk) => chunk,
        Err(err) => {
            let _ = tx
                .send(StreamEvent::Error(ProviderError::Stream(format!(
                    "decoding stream chunk: {err}"
                ))))
                .await;
            return false;
        }
    };

    if let Some(error) = chunk.error {
        let _ = tx
            .send(StreamEvent::Error(ProviderError::Api {
                provider: "google",
                message: error.message,
            }))
            .await;
        return false;
    }

    let parsed = parse_chunk(&chunk, tool_index);
    if !parsed.content.is_empty()
        && tx.send(StreamEvent::Text(parsed.content)).await.is_err()
    {
        return false;
    }
    for call in parsed.tool_calls {
        if tx.send(StreamEvent::ToolCalls(vec![call])).await.is_err() {
            return false;
        }
    }
    true
}

/// Concatenate text parts and collect function calls from one response.
fn parse_chunk(chunk: &GenerateContentResponse, tool_index: &mut usize) -> Response {
    let mut result = Response::default();
    for candidate in chunk.candidates.iter().flatten() {
        let Some(content) = &candidate.content else {
            continue;
        };
        for part in content.parts.iter().flatten() {
            if let Some(text) = &part.text {
                result.content.push_str(text);
            }
            if let Some(call) = &part.function_call {
                let args = call
                    .args
                    .clone()
                    .unwrap_or(Value::Object(Default::default()));
                let id = format!("fc_{tool_index}");
                *tool_index += 1;
                result
                    .tool_calls
                    .push(ToolCall::new(id, call.name.clone(), args.to_string()));
            }
        }
    }
    result
}

/// Incremental scanner over a streamed JSON array.
///
/// Yields each complete top-level element as a string slice of the
/// input; tolerates elements split anywhere, including inside string
/// literals and escapes.
struct JsonArrayDecoder {
    buf: String,
    started: bool,
    finished: bool,
}

impl JsonArrayDecoder {
    fn new() -> Self {
        Self {
            buf: String::with_capacity(512),
            started: false,
            finished: false,
        }
    }

    fn push(&mut self, chunk: &str) {
        self.buf.push_str(chunk);
    }

    fn finished(&self) -> bool {
        self.finished
    }

    /// Next complete element, `Ok(None)` until more data arrives.
    fn next_element(&mut self) -> Result<Option<String>, String> {
        loop {
            let skip = self
                .buf
                .find(|c: char| !c.is_whitespace() && c != ',')
                .unwrap_or(self.buf.len());
            self.buf.drain(..skip);

            let Some(first) = self.buf.chars().next() else {
                return Ok(None);
            };

            if self.finished {
                return Ok(None);
            }
            if !self.started {
                if first != '[' {
                    return Err("unexpected stream format".to_string());
                }
                self.started = true;
                self.buf.drain(..1);
                continue;
            }
            if first == ']' {
                self.finished = true;
                self.buf.drain(..1);
                return Ok(None);
            }

            return Ok(self.scan_element());
        }
    }

    /// Scan one balanced JSON value from the front of the buffer.
    fn scan_element(&mut self) -> Option<String> {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (i, c) in self.buf.char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' | '[' => depth += 1,
                '}' | ']' => {
                    if depth == 0 {
                        // Closing bracket of the outer array terminates a
                        // bare scalar element.
                        end = Some(i);
                        break;
                    }
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i + c.len_utf8());
                        break;
                    }
                }
                ',' if depth == 0 => {
                    end = Some(i);
                    break;
                }
                _ => {}
            }
        }

        let end = end?;
        let element = self.buf[..end].trim().to_string();
        self.buf.drain(..end);
        if element.is_empty() {
            None
        } else {
            Some(element)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionCall {
    name: String,
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    message: String,
}
