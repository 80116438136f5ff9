//! Conversation types shared across the workspace.
//!
//! These form the representation boundary between the session runner and
//! the provider adapters: each adapter lowers them into its own wire
//! format and raises streaming responses back into [`ToolCall`]s and text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in the conversation history.
///
/// Invariant maintained by the runner: `Tool` messages always follow an
/// `Assistant` message carrying the tool calls they answer, with matching
/// IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// System prompt (at most one, first in the conversation).
    System { content: String },
    /// User input.
    User { content: String },
    /// Assistant response, possibly requesting tool calls.
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Result of executing a tool call.
    Tool {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: Option<String>) -> Self {
        Self::Tool {
            content: content.into(),
            tool_call_id,
        }
    }

    /// Wire-format role string.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// Text content regardless of role.
    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID assigned by the model (echoed back in the tool result).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as a JSON string, exactly as the model delivered them.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A tool made available to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the argument object.
    pub parameters: Value,
}

/// Everything needed to send one turn to a provider.
///
/// `model`, `max_tokens`, and `temperature` override the adapter's own
/// defaults when set.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDef>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

/// Complete, non-streaming result of a provider call.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Accumulated assistant text.
    pub content: String,
    /// Tool invocations requested by the model, in arrival order.
    pub tool_calls: Vec<ToolCall>,
    /// Provider-supplied chain-of-thought summary, when present.
    pub reasoning_summary: String,
}
