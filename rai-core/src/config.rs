//! Configuration merging across the five settings layers.
//!
//! The effective settings map is composed from, in increasing precedence:
//! built-in defaults, `RAI_*` environment variables, the `.rai/config`
//! file, agent-file frontmatter, and CLI overrides. Unknown keys pass
//! through untouched; adapters ignore what they do not recognize.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::RAI_DIR;

const CONFIG_FILE_NAME: &str = "config";

/// Effective settings: string keys to string values, sorted for
/// deterministic serialization.
pub type SettingsMap = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config line {line}")]
    InvalidLine { line: usize },

    #[error("invalid config line {line}: empty key")]
    EmptyKey { line: usize },

    #[error("invalid config line {line}: {reason}")]
    BadQuoting { line: usize, reason: String },

    #[error("config key cannot be empty")]
    EmptyConfigKey,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Path of the local config file under the given base directory.
pub fn config_path(base_dir: &Path) -> PathBuf {
    base_dir.join(RAI_DIR).join(CONFIG_FILE_NAME)
}

/// Merge config maps from lowest to highest precedence; later layers win.
pub fn merge_precedence(
    defaults: &SettingsMap,
    env: &SettingsMap,
    file: &SettingsMap,
    agent: &SettingsMap,
    cli: &SettingsMap,
) -> SettingsMap {
    let mut merged = SettingsMap::new();
    for layer in [defaults, env, file, agent, cli] {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Settings sourced from `RAI_`-prefixed environment variables.
///
/// The prefix is stripped and the remainder lowercased (underscores
/// preserved), so `RAI_API_KEY` contributes the key `api_key`.
pub fn env_values() -> SettingsMap {
    env_values_from(std::env::vars())
}

/// Extract settings from an explicit variable iterator.
///
/// Exists so tests stay deterministic without mutating the process-wide
/// environment (which is unsafe in multi-threaded programs on Unix).
pub fn env_values_from<I>(vars: I) -> SettingsMap
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut values = SettingsMap::new();
    for (name, value) in vars {
        let Some(suffix) = name.strip_prefix("RAI_") else {
            continue;
        };
        if suffix.is_empty() {
            continue;
        }
        values.insert(suffix.to_lowercase(), value);
    }
    values
}

/// Read the local config file; a missing file is an empty configuration.
pub fn load(base_dir: &Path) -> Result<SettingsMap, ConfigError> {
    let path = config_path(base_dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SettingsMap::new());
        }
        Err(err) => return Err(err.into()),
    };
    parse(&content)
}

/// Parse `key = "value"` lines; `#` starts a comment, blank lines skip.
pub fn parse(content: &str) -> Result<SettingsMap, ConfigError> {
    let mut values = SettingsMap::new();
    for (index, raw_line) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, raw_value)) = line.split_once('=') else {
            return Err(ConfigError::InvalidLine { line: line_number });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::EmptyKey { line: line_number });
        }
        let raw_value = raw_value.trim();
        let value = if raw_value.starts_with('"') {
            serde_json::from_str::<String>(raw_value).map_err(|err| ConfigError::BadQuoting {
                line: line_number,
                reason: err.to_string(),
            })?
        } else {
            raw_value.to_string()
        };
        values.insert(key.to_string(), value);
    }
    Ok(values)
}

/// Render a settings map in the on-disk format: sorted keys, quoted values.
pub fn serialize(values: &SettingsMap) -> String {
    let mut out = String::new();
    for (key, value) in values {
        out.push_str(key);
        out.push_str(" = ");
        // JSON string encoding round-trips exactly through `parse`.
        out.push_str(&serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string()));
        out.push('\n');
    }
    out
}

/// Update a single key in the local config file, creating it if needed.
pub fn set(base_dir: &Path, key: &str, value: &str) -> Result<(), ConfigError> {
    if key.trim().is_empty() {
        return Err(ConfigError::EmptyConfigKey);
    }

    let mut values = load(base_dir)?;
    values.insert(key.trim().to_string(), value.to_string());

    let config_dir = base_dir.join(RAI_DIR);
    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(config_path(base_dir), serialize(&values))?;
    Ok(())
}

/// Load `.rai/config` and merge it with env, agent, and CLI values.
pub fn load_merged(
    base_dir: &Path,
    agent: &SettingsMap,
    cli: &SettingsMap,
    defaults: &SettingsMap,
) -> Result<SettingsMap, ConfigError> {
    let file_values = load(base_dir)?;
    Ok(merge_precedence(
        defaults,
        &env_values(),
        &file_values,
        agent,
        cli,
    ))
}
