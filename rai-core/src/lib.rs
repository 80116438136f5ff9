//! rai-core - shared types and configuration for rai
//!
//! This crate holds the conversation data model exchanged with LLM
//! providers, the five-layer settings merge, and agent-file parsing.
//! It knows nothing about HTTP or any particular backend.

pub mod agent;
pub mod config;
pub mod types;

pub use agent::{AgentError, AgentFile};
pub use config::{ConfigError, SettingsMap};
pub use types::{Message, Request, Response, ToolCall, ToolDef};

/// Name of the per-directory state folder.
pub const RAI_DIR: &str = ".rai";
