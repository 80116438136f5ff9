//! Agent-file parsing.
//!
//! An agent file is a markdown document, optionally preceded by a YAML
//! frontmatter block. Frontmatter entries become one settings layer; the
//! body becomes the system prompt. Unknown keys are carried through but
//! reported as warnings.

use crate::config::SettingsMap;
use std::collections::BTreeMap;
use std::path::Path;

/// Parsed agent file data.
#[derive(Debug, Clone, Default)]
pub struct AgentFile {
    pub system_prompt: String,
    pub settings: SettingsMap,
    pub warnings: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent frontmatter missing closing delimiter")]
    UnterminatedFrontmatter,

    #[error("invalid agent frontmatter: {0}")]
    InvalidFrontmatter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Settings keys an agent file is expected to carry. Anything else still
/// merges but produces a warning.
const KNOWN_KEYS: &[&str] = &[
    "api-key",
    "endpoint",
    "max-tokens",
    "max_tokens",
    "model",
    "org",
    "organization",
    "provider",
    "temperature",
    "top-p",
    "top_p",
    "tool-choice",
    "tool_choice",
    "max-output-tokens",
    "max_output_tokens",
];

/// Load and parse an agent file from disk.
pub fn parse_file(path: &Path) -> Result<AgentFile, AgentError> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

/// Parse agent file content.
pub fn parse(content: &str) -> Result<AgentFile, AgentError> {
    let content = content.replace("\r\n", "\n");
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    if !content.starts_with("---\n") && content != "---" {
        return Ok(AgentFile {
            system_prompt: content.to_string(),
            ..Default::default()
        });
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let end = lines[1..]
        .iter()
        .position(|line| line.trim() == "---")
        .map(|i| i + 1)
        .ok_or(AgentError::UnterminatedFrontmatter)?;

    let yaml_block = lines[1..end].join("\n");
    let body = lines[end + 1..].join("\n");
    let body = body.strip_prefix('\n').unwrap_or(&body).to_string();

    let parsed: BTreeMap<String, serde_yml::Value> = serde_yml::from_str(&yaml_block)
        .map_err(|err| AgentError::InvalidFrontmatter(err.to_string()))?;

    let mut settings = SettingsMap::new();
    let mut warnings = Vec::new();
    for (key, value) in parsed {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            warnings.push(format!("unknown agent key: {key}"));
        }
        settings.insert(key, stringify_yaml(&value));
    }

    Ok(AgentFile {
        system_prompt: body,
        settings,
        warnings,
    })
}

/// Render a YAML scalar the way it would read in a flat settings file.
fn stringify_yaml(value: &serde_yml::Value) -> String {
    match value {
        serde_yml::Value::String(s) => s.clone(),
        serde_yml::Value::Bool(b) => b.to_string(),
        serde_yml::Value::Number(n) => n.to_string(),
        serde_yml::Value::Null => String::new(),
        other => serde_yml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_markdown_is_all_prompt() {
        let agent = parse("You are a helpful assistant.").unwrap();
        assert_eq!(agent.system_prompt, "You are a helpful assistant.");
        assert!(agent.settings.is_empty());
        assert!(agent.warnings.is_empty());
    }

    #[test]
    fn test_parse_frontmatter_and_body() {
        let content = "---\nmodel: gpt-4\ntemperature: 0.2\n---\n\nBe terse.";
        let agent = parse(content).unwrap();
        assert_eq!(agent.settings["model"], "gpt-4");
        assert_eq!(agent.settings["temperature"], "0.2");
        assert_eq!(agent.system_prompt, "Be terse.");
        assert!(agent.warnings.is_empty());
    }

    #[test]
    fn test_parse_unknown_key_warns_but_merges() {
        let content = "---\nmodel: gpt-4\nfavourite-colour: blue\n---\nbody";
        let agent = parse(content).unwrap();
        assert_eq!(agent.settings["favourite-colour"], "blue");
        assert_eq!(agent.warnings, vec!["unknown agent key: favourite-colour"]);
    }

    #[test]
    fn test_parse_missing_closing_delimiter() {
        let err = parse("---\nmodel: gpt-4\nbody without close").unwrap_err();
        assert!(matches!(err, AgentError::UnterminatedFrontmatter));
    }

    #[test]
    fn test_parse_crlf_and_bom() {
        let content = "\u{feff}---\r\nmodel: gpt-4\r\n---\r\nprompt";
        let agent = parse(content).unwrap();
        assert_eq!(agent.settings["model"], "gpt-4");
        assert_eq!(agent.system_prompt, "prompt");
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = parse("---\n: [unbalanced\n---\nbody").unwrap_err();
        assert!(matches!(err, AgentError::InvalidFrontmatter(_)));
    }

    #[test]
    fn test_numeric_and_bool_values_stringified() {
        let content = "---\nmax-tokens: 2048\ntool-choice: true\n---\n";
        let agent = parse(content).unwrap();
        assert_eq!(agent.settings["max-tokens"], "2048");
        assert_eq!(agent.settings["tool-choice"], "true");
    }
}
