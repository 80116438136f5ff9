//! Incremental SSE line buffering shared by the SSE-speaking adapters.
//!
//! HTTP chunks arrive split at arbitrary byte boundaries; this buffer
//! reassembles complete lines and exposes the `data:`/`event:` prefix
//! helpers used by the per-provider parsers.

/// Whether a parsed line was terminal for the stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    Continue,
    Finished,
}

/// Accumulates response bytes and yields trimmed lines.
pub(crate) struct SseLineBuffer {
    buf: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self {
            buf: String::with_capacity(4096),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Next complete line, trimmed. `None` until more data arrives.
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.buf.find('\n')?;
        let line = self.buf[..newline].trim().to_string();
        self.buf.drain(..=newline);
        Some(line)
    }

    /// Final unterminated line once the stream has ended, if any.
    pub fn take_remainder(&mut self) -> Option<String> {
        let line = self.buf.trim().to_string();
        self.buf.clear();
        if line.is_empty() { None } else { Some(line) }
    }
}

/// Strip the SSE `data:` prefix, tolerating a missing space.
pub(crate) fn strip_data_prefix(line: &str) -> Option<&str> {
    line.strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
        .map(str::trim_start)
}

/// Strip the SSE `event:` prefix, tolerating a missing space.
pub(crate) fn strip_event_prefix(line: &str) -> Option<&str> {
    line.strip_prefix("event: ")
        .or_else(|| line.strip_prefix("event:"))
        .map(str::trim_start)
}
