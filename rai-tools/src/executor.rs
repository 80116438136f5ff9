//! Dispatch of model-requested tool calls.

use crate::error::ToolError;
use crate::terminal::{DEFAULT_TIMEOUT, parse_terminal_args, run_terminal_command};
use rai_core::{ToolCall, ToolDef};
use rai_skills::Skill;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the built-in shell tool, always declared to the model.
pub const TERMINAL_TOOL_NAME: &str = "terminal";

/// Executes tool calls against the session's base directory and
/// discovered skills.
pub struct ToolExecutor {
    base_dir: PathBuf,
    skills: Vec<Skill>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(base_dir: impl Into<PathBuf>, skills: Vec<Skill>) -> Self {
        Self {
            base_dir: base_dir.into(),
            skills,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the terminal deadline (tests use short ones).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Definition of the built-in terminal tool.
    pub fn terminal_tool_def() -> ToolDef {
        ToolDef {
            name: TERMINAL_TOOL_NAME.to_string(),
            description: "Run a shell command in the current workspace.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Shell command to run."
                    }
                },
                "required": ["command"]
            }),
        }
    }

    /// Tool definitions for a session: `terminal` plus one per skill.
    pub fn tool_defs(&self) -> Vec<ToolDef> {
        let mut defs = vec![Self::terminal_tool_def()];
        for skill in &self.skills {
            defs.push(ToolDef {
                name: skill.name.clone(),
                description: skill.description.clone(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            });
        }
        defs
    }

    /// Execute one tool call and return its stringified result.
    ///
    /// Skills currently return their markdown body as instructions;
    /// script execution is wired separately.
    pub async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        if call.name == TERMINAL_TOOL_NAME {
            let args = parse_terminal_args(&call.arguments)?;
            return run_terminal_command(&args.command, &self.base_dir, self.timeout).await;
        }

        for skill in &self.skills {
            if skill.name == call.name {
                return Ok(format!("[skill: {}]\n{}", skill.name, skill.body));
            }
        }

        Err(ToolError::UnknownTool(call.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(name: &str, body: &str) -> Skill {
        Skill {
            name: name.to_string(),
            description: format!("{name} description"),
            dir: PathBuf::from("/tmp"),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_tool_defs_terminal_always_first() {
        let executor = ToolExecutor::new("/tmp", vec![skill("git-helper", "use git")]);
        let defs = executor.tool_defs();

        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "terminal");
        assert_eq!(defs[0].parameters["required"][0], "command");
        assert_eq!(defs[1].name, "git-helper");
        assert_eq!(defs[1].parameters["properties"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_execute_skill_returns_body() {
        let executor = ToolExecutor::new("/tmp", vec![skill("git-helper", "use git status")]);
        let call = ToolCall::new("c1", "git-helper", "{}");

        let result = executor.execute(&call).await.unwrap();
        assert_eq!(result, "[skill: git-helper]\nuse git status");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let executor = ToolExecutor::new("/tmp", vec![]);
        let call = ToolCall::new("c1", "get_weather", "{\"city\":\"Paris\"}");

        let err = executor.execute(&call).await.unwrap_err();
        assert_eq!(err.to_string(), "unknown tool: get_weather");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ToolExecutor::new(dir.path(), vec![]);
        let call = ToolCall::new("c1", "terminal", "{\"command\":\"echo executed\"}");

        let result = executor.execute(&call).await.unwrap();
        assert!(result.contains("executed"));
    }

    #[tokio::test]
    async fn test_execute_terminal_missing_command() {
        let executor = ToolExecutor::new("/tmp", vec![]);
        let call = ToolCall::new("c1", "terminal", "{}");

        let err = executor.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingCommand));
    }
}
