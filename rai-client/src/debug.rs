//! Raw HTTP capture for `-log DEBUG`.
//!
//! When the CLI enables debug logging and a writable session log exists,
//! each adapter appends its request method/URL/body and the response
//! status/body to the log. Streaming response bodies are skipped so the
//! capture never consumes an SSE stream.

use rai_core::SettingsMap;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;

/// Internal settings keys populated by the CLI when `-log DEBUG` is on.
pub const LOG_LEVEL_KEY: &str = "_log_level";
pub const LOG_PATH_KEY: &str = "_log_path";

/// Append-only HTTP capture handle. Disabled by default; cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct DebugCapture {
    path: Option<PathBuf>,
}

impl DebugCapture {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Enabled only when `_log_level` is DEBUG and `_log_path` is set.
    pub fn from_settings(settings: &SettingsMap) -> Self {
        let level = settings.get(LOG_LEVEL_KEY).map(String::as_str).unwrap_or("");
        if !level.eq_ignore_ascii_case("DEBUG") {
            return Self::disabled();
        }
        let path = settings.get(LOG_PATH_KEY).map(String::as_str).unwrap_or("");
        if path.trim().is_empty() {
            return Self::disabled();
        }
        Self {
            path: Some(PathBuf::from(path)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn request(&self, provider: &str, method: &str, url: &str, body: &Value) {
        self.append(
            "--- DEBUG provider request ---",
            &format!("provider={provider}\n{method} {url}\nBody:\n{body}\n"),
        );
    }

    pub fn response(&self, provider: &str, status: u16, body: &str) {
        self.append(
            "--- DEBUG provider response ---",
            &format!("provider={provider}\nStatus: {status}\nBody:\n{body}\n"),
        );
    }

    /// Streaming responses record the status only.
    pub fn response_streaming(&self, provider: &str, status: u16) {
        self.append(
            "--- DEBUG provider response ---",
            &format!("provider={provider}\nStatus: {status}\nBody: <skipped: streaming>\n"),
        );
    }

    fn append(&self, title: &str, payload: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path);
        match file {
            Ok(mut file) => {
                let _ = writeln!(file);
                let _ = writeln!(file, "{title}");
                let _ = write!(file, "{payload}");
            }
            Err(err) => {
                tracing::debug!(error = %err, "debug capture append failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> SettingsMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_disabled_without_debug_level() {
        assert!(!DebugCapture::from_settings(&settings(&[])).is_enabled());
        assert!(
            !DebugCapture::from_settings(&settings(&[(LOG_PATH_KEY, "/tmp/x.log")])).is_enabled()
        );
        assert!(
            !DebugCapture::from_settings(&settings(&[(LOG_LEVEL_KEY, "DEBUG")])).is_enabled()
        );
    }

    #[test]
    fn test_enabled_case_insensitive() {
        let capture = DebugCapture::from_settings(&settings(&[
            (LOG_LEVEL_KEY, "debug"),
            (LOG_PATH_KEY, "/tmp/rai.log"),
        ]));
        assert!(capture.is_enabled());
    }

    #[test]
    fn test_capture_appends_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let capture = DebugCapture::from_settings(&settings(&[
            (LOG_LEVEL_KEY, "DEBUG"),
            (LOG_PATH_KEY, path.to_str().unwrap()),
        ]));

        capture.request(
            "openai",
            "POST",
            "https://fake/responses",
            &serde_json::json!({"model": "gpt-4"}),
        );
        capture.response_streaming("openai", 200);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("--- DEBUG provider request ---"));
        assert!(content.contains("POST https://fake/responses"));
        assert!(content.contains("Body: <skipped: streaming>"));
    }
}
