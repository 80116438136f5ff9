//! The prompt-to-response execution loop.
//!
//! The runner assembles the conversation (system prompt, user prompt,
//! skill context), opens a stream from the resolved provider, forwards
//! text to the output sink, and handles tool calls by executing terminal
//! commands or skills and feeding results back. Providers may keep
//! requesting tools, so the loop repeats until the model responds with
//! text only or the iteration cap is reached.

use crate::output::{EventKind, Sink};
use rai_client::ProviderError;
use rai_client::provider::{Provider, StreamEvent};
use rai_core::{Message, Request};
use rai_skills::{Skill, format_context};
use rai_tools::{TERMINAL_TOOL_NAME, ToolExecutor, parse_terminal_args};
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound on provider round-trips within one session.
pub const MAX_TOOL_ITERATIONS: usize = 10;

/// Everything the runner needs to execute one session.
pub struct SessionConfig {
    pub provider: Arc<dyn Provider>,
    pub sink: Arc<Sink>,
    pub system_prompt: String,
    pub user_prompt: String,
    pub skills: Vec<Skill>,
    pub base_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("exceeded {0} tool call iterations")]
    IterationLimit(usize),
}

/// Execute a single prompt session: send to the provider, stream output,
/// handle tool calls, and repeat until a final text response is
/// produced.
pub async fn run(cfg: SessionConfig) -> Result<(), SessionError> {
    let executor = ToolExecutor::new(&cfg.base_dir, cfg.skills.clone());
    let tools = executor.tool_defs();
    let mut messages = build_messages(&cfg);

    for _ in 0..MAX_TOOL_ITERATIONS {
        let request = Request {
            messages: messages.clone(),
            tools: tools.clone(),
            ..Default::default()
        };

        tracing::debug!(provider = cfg.provider.name(), "opening completion stream");
        let mut rx = match cfg.provider.stream(&request).await {
            Ok(rx) => rx,
            Err(err) => {
                cfg.sink
                    .emit(EventKind::Err, &format!("provider error: {err}"));
                return Err(err.into());
            }
        };

        let mut full_text = String::new();
        let mut reasoning_summary = String::new();
        let mut tool_calls = Vec::new();
        let mut streaming_ai = false;

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Text(chunk) => {
                    full_text.push_str(&chunk);
                    if !cfg.sink.is_silent() {
                        if !streaming_ai {
                            cfg.sink.begin_ai_stream();
                            streaming_ai = true;
                        }
                        cfg.sink.emit_ai_chunk(&chunk);
                    }
                }
                StreamEvent::Reasoning(chunk) => {
                    reasoning_summary.push_str(&chunk);
                }
                StreamEvent::ToolCalls(calls) => {
                    tool_calls.extend(calls);
                }
                StreamEvent::Done => {}
                StreamEvent::Error(err) => {
                    if streaming_ai {
                        cfg.sink.end_ai_stream(&full_text);
                    }
                    cfg.sink
                        .emit(EventKind::Err, &format!("stream error: {err}"));
                    return Err(err.into());
                }
            }
        }

        if streaming_ai {
            cfg.sink.end_ai_stream(&full_text);
        }

        if reasoning_summary.is_empty() {
            reasoning_summary = infer_reasoning_summary(&full_text);
        }

        // The silent final response is logged by emit_final instead.
        if !full_text.is_empty() && !(cfg.sink.is_silent() && tool_calls.is_empty()) {
            cfg.sink.emit_log(EventKind::Ai, &full_text);
        }

        if tool_calls.is_empty() {
            if cfg.sink.is_silent() {
                cfg.sink.emit_final(&full_text);
            }
            emit_reasoning(&cfg.sink, &reasoning_summary);
            return Ok(());
        }

        emit_reasoning(&cfg.sink, &reasoning_summary);

        messages.push(Message::assistant(full_text, tool_calls.clone()));

        for call in &tool_calls {
            let label = if call.name == TERMINAL_TOOL_NAME {
                match parse_terminal_args(&call.arguments) {
                    Ok(args) => args.command,
                    Err(err) => {
                        cfg.sink
                            .emit(EventKind::Err, &format!("tool error: {err}"));
                        messages.push(Message::tool(
                            format!("[{} result]\n{err}", call.name),
                            None,
                        ));
                        continue;
                    }
                }
            } else {
                format!("tool: {}({})", call.name, call.arguments)
            };
            cfg.sink.emit(EventKind::Cmd, &label);

            let tool_result = match executor.execute(call).await {
                Ok(result) => {
                    cfg.sink.emit(EventKind::Out, &result);
                    result
                }
                Err(err) => {
                    let err_msg = format!("tool error: {err}");
                    cfg.sink.emit(EventKind::Err, &err_msg);
                    let partial = err.partial_output();
                    if partial.is_empty() {
                        err_msg
                    } else {
                        cfg.sink.emit(EventKind::Out, partial);
                        format!("{err_msg}\n{partial}")
                    }
                }
            };

            messages.push(Message::tool(
                format!("[{} result]\n{tool_result}", call.name),
                Some(call.id.clone()),
            ));
        }
    }

    cfg.sink
        .emit(EventKind::Err, "maximum tool call iterations reached");
    Err(SessionError::IterationLimit(MAX_TOOL_ITERATIONS))
}

/// Assemble the initial conversation: system prompt plus skill context,
/// then the user prompt.
fn build_messages(cfg: &SessionConfig) -> Vec<Message> {
    let mut system = cfg.system_prompt.clone();
    if !cfg.skills.is_empty() {
        let skill_ctx = format_context(&cfg.skills);
        if !skill_ctx.is_empty() {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(&skill_ctx);
        }
    }

    let mut messages = Vec::new();
    if !system.is_empty() {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(cfg.user_prompt.clone()));
    messages
}

fn emit_reasoning(sink: &Sink, reasoning_summary: &str) {
    if reasoning_summary.is_empty() {
        return;
    }
    if sink.is_silent() {
        sink.emit_log(EventKind::Reasoning, reasoning_summary);
    } else {
        sink.emit(EventKind::Reasoning, reasoning_summary);
    }
}

/// Fall back to scanning the answer for an inline reasoning section when
/// the provider sent no reasoning summary.
fn infer_reasoning_summary(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    for (i, line) in lines.iter().enumerate() {
        let lower = line.trim().to_lowercase();
        if lower.starts_with("work:")
            || lower.starts_with("reasoning:")
            || lower.starts_with("steps:")
        {
            return lines[i..].join("\n").trim().to_string();
        }
    }
    String::new()
}
