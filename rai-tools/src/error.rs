//! Tool execution errors.
//!
//! Failure classes carry any output captured before the failure so the
//! model can see both the error annotation and the partial output.

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("terminal tool requires command")]
    MissingCommand,

    #[error("invalid terminal arguments: {0}")]
    InvalidArguments(String),

    #[error("command timed out")]
    Timeout { output: String },

    #[error("command failed: {reason}")]
    CommandFailed { reason: String, output: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("spawning command: {0}")]
    Spawn(String),
}

impl ToolError {
    /// Output captured before the failure, when any.
    pub fn partial_output(&self) -> &str {
        match self {
            Self::Timeout { output } | Self::CommandFailed { output, .. } => output,
            _ => "",
        }
    }
}
