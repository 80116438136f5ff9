//! rai-client - LLM provider adapters for rai
//!
//! A unified [`Provider`] interface over four backends: OpenAI-compatible
//! Responses APIs, Anthropic's Messages API, Google's Gemini
//! `generateContent` API, and GitHub Copilot (which routes between its
//! Chat and Responses wire formats). Each adapter normalizes its
//! streaming response into the common [`StreamEvent`] type, hiding
//! provider-specific quirks, and funnels HTTP failures through one
//! normalized error shape.

pub mod anthropic;
pub mod copilot;
pub mod copilot_auth;
pub mod debug;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod provider;
mod sse;

pub use anthropic::AnthropicProvider;
pub use copilot::{CopilotProvider, should_use_responses_api};
pub use copilot_auth::{
    CopilotAuth, copilot_base_url, device_auth, load_token, normalize_domain, save_token,
};
pub use debug::DebugCapture;
pub use error::ProviderError;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use provider::{Provider, STREAM_CHANNEL_CAPACITY, StreamEvent, resolve};
