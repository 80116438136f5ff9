//! Provider interface, stream events, and provider resolution.
//!
//! The CLI needs a single code path for prompt execution regardless of
//! which backend handles the request, and streaming is first-class.
//! Each adapter's streaming path spawns one producer task that owns the
//! HTTP response body and writes events into a bounded channel; the
//! receive end is handed to the session runner. Dropping the receiver
//! aborts the producer on its next send, which releases the body.

use crate::anthropic::AnthropicProvider;
use crate::copilot::CopilotProvider;
use crate::copilot_auth::copilot_base_url;
use crate::debug::DebugCapture;
use crate::error::ProviderError;
use async_trait::async_trait;
use rai_core::{Request, Response, SettingsMap, ToolCall};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Bounded capacity of the streaming event channel. Backpressure beyond
/// this is the consumer's responsibility.
pub const STREAM_CHANNEL_CAPACITY: usize = 16;

/// One chunk of streaming output from a provider.
///
/// `Done` and `Error` are terminal: no further events follow either, and
/// the producer closes the channel immediately after.
#[derive(Debug)]
pub enum StreamEvent {
    /// Incremental assistant text.
    Text(String),
    /// Incremental reasoning-summary text.
    Reasoning(String),
    /// Completed tool invocation requests.
    ToolCalls(Vec<ToolCall>),
    /// End of stream.
    Done,
    /// Provider-side failure.
    Error(ProviderError),
}

/// Interface every LLM backend implements.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Human-readable provider identifier (e.g. "openai", "anthropic").
    fn name(&self) -> &'static str;

    /// Send a request and return the full response.
    async fn complete(&self, request: &Request) -> Result<Response, ProviderError>;

    /// Send a request and return the receive end of the event channel.
    ///
    /// Errors detected before streaming begins (bad settings, transport
    /// failure, non-2xx status) are returned directly; once a channel is
    /// handed out, failures arrive in-band as [`StreamEvent::Error`].
    /// Callers must read until the channel closes or drop the receiver
    /// to cancel.
    async fn stream(&self, request: &Request)
    -> Result<mpsc::Receiver<StreamEvent>, ProviderError>;
}

fn lookup<'a>(settings: &'a SettingsMap, key: &str) -> &'a str {
    settings.get(key).map(String::as_str).unwrap_or("")
}

fn lookup_either<'a>(settings: &'a SettingsMap, key: &str, alias: &str) -> &'a str {
    let value = lookup(settings, key);
    if value.is_empty() {
        lookup(settings, alias)
    } else {
        value
    }
}

/// Select and construct a provider from the effective settings map.
///
/// Selection order:
/// 1. Explicit `provider` key for the GitHub Copilot variants.
/// 2. Endpoint URL heuristics (`anthropic` substring, the Gemini host,
///    OpenAI-compatible fallback).
/// 3. Error when nothing matches.
pub fn resolve(settings: &SettingsMap) -> Result<Arc<dyn Provider>, ProviderError> {
    let explicit = lookup(settings, "provider").trim();
    if explicit == "github-copilot" || explicit == "github-copilot-enterprise" {
        return resolve_copilot(settings, explicit);
    }

    let endpoint = lookup(settings, "endpoint").trim();
    if endpoint.is_empty() {
        return Err(ProviderError::NoProvider);
    }

    let api_key = lookup_either(settings, "api-key", "api_key");
    if api_key.is_empty() {
        return Err(ProviderError::AuthRequired);
    }

    let model = lookup(settings, "model");
    if model.is_empty() {
        return Err(ProviderError::ModelRequired);
    }

    let debug = DebugCapture::from_settings(settings);
    let max_tokens = lookup_either(settings, "max-tokens", "max_tokens")
        .parse::<u32>()
        .ok();
    let temperature = lookup(settings, "temperature").parse::<f64>().ok();

    if endpoint.contains("anthropic") {
        Ok(Arc::new(
            AnthropicProvider::new(endpoint, api_key, model)
                .with_limits(max_tokens, temperature)
                .with_debug(debug),
        ))
    } else if endpoint.contains("generativelanguage.googleapis.com") {
        Ok(Arc::new(
            crate::gemini::GeminiProvider::new(endpoint, api_key, model)
                .with_limits(max_tokens, temperature)
                .with_debug(debug),
        ))
    } else {
        Ok(Arc::new(
            crate::openai::OpenAiProvider::new(endpoint, api_key, model)
                .with_limits(max_tokens, temperature)
                .with_debug(debug),
        ))
    }
}

/// Construct the Copilot adapter. The token is sourced from
/// `api-key`/`api_key`/`copilot-token`; the CLI layer is responsible for
/// loading a stored token into the settings map beforehand.
fn resolve_copilot(
    settings: &SettingsMap,
    provider_id: &str,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let mut token = lookup_either(settings, "api-key", "api_key");
    if token.is_empty() {
        token = lookup(settings, "copilot-token");
    }
    if token.is_empty() {
        return Err(ProviderError::CopilotTokenRequired);
    }

    let enterprise_url = if provider_id == "github-copilot-enterprise" {
        let url = lookup_either(settings, "enterprise-url", "enterprise_url");
        if url.is_empty() {
            return Err(ProviderError::EnterpriseUrlRequired);
        }
        url
    } else {
        ""
    };

    let mut model = lookup(settings, "model");
    if model.is_empty() {
        model = "gpt-5-mini"; // default free Copilot model
    }

    let max_tokens = lookup_either(settings, "max-tokens", "max_tokens")
        .parse::<u32>()
        .ok();
    let temperature = lookup(settings, "temperature").parse::<f64>().ok();

    Ok(Arc::new(
        CopilotProvider::new(copilot_base_url(enterprise_url), token, model)
            .with_limits(max_tokens, temperature)
            .with_debug(DebugCapture::from_settings(settings)),
    ))
}
