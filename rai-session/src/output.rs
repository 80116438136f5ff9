//! Event-based session output.
//!
//! Three modes:
//!   - default: all events (reasoning, commands, outputs, errors) stream
//!     to the console;
//!   - silent: only errors and the final response reach the console;
//!   - logged: every event is also written to a timestamped log file
//!     under `.rai/log/`.
//!
//! Silent and logged combine: everything goes to the log, only the final
//! response and errors appear on the console. All methods serialize
//! through a single mutex, so concurrent producers never interleave
//! characters within a line.

use chrono::Local;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use rai_core::RAI_DIR;

const LOG_DIR_NAME: &str = "log";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Kind of output event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Assistant message text.
    Ai,
    /// Reasoning summary text.
    Reasoning,
    /// Terminal command being executed.
    Cmd,
    /// Terminal command output.
    Out,
    /// Error or warning.
    Err,
}

impl EventKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ai => "AI",
            Self::Reasoning => "REASON",
            Self::Cmd => "CMD",
            Self::Out => "OUT",
            Self::Err => "ERR",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("creating log directory: {0}")]
    CreateLogDir(std::io::Error),

    #[error("creating log file: {0}")]
    CreateLogFile(std::io::Error),
}

/// Configuration for a [`Sink`].
pub struct SinkOptions {
    /// Suppress console output except errors and the final response.
    pub silent: bool,
    /// Write all events to a log file in `.rai/log/`.
    pub log: bool,
    /// Working directory root (for `.rai/log/`).
    pub base_dir: PathBuf,
    /// Writer for console output (typically stdout).
    pub console: Box<dyn Write + Send>,
}

struct SinkState {
    console: Box<dyn Write + Send>,
    log_file: Option<File>,
    log_path: Option<PathBuf>,
}

/// Receives output events and writes them to console and/or a log file.
/// Safe for concurrent use.
pub struct Sink {
    state: Mutex<SinkState>,
    silent: bool,
}

impl Sink {
    /// Create a sink. When logging is enabled the `.rai/log/` directory
    /// and a new log file are created immediately, so callers get an
    /// early error if the path is not writable.
    pub fn new(opts: SinkOptions) -> Result<Self, SinkError> {
        let (log_file, log_path) = if opts.log {
            let log_dir = opts.base_dir.join(RAI_DIR).join(LOG_DIR_NAME);
            std::fs::create_dir_all(&log_dir).map_err(SinkError::CreateLogDir)?;
            let name = format!("rai-log-{}.log", Local::now().format("%Y%m%d.%H%M%S"));
            let path = log_dir.join(name);
            let file = File::create(&path).map_err(SinkError::CreateLogFile)?;
            (Some(file), Some(path))
        } else {
            (None, None)
        };

        Ok(Self {
            state: Mutex::new(SinkState {
                console: opts.console,
                log_file,
                log_path,
            }),
            silent: opts.silent,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write the session preamble to the log file. No-op when logging is
    /// disabled.
    pub fn write_header(
        &self,
        args: &BTreeMap<String, String>,
        agent_content: &str,
        prompt: &str,
    ) {
        let mut state = self.lock();
        let Some(file) = state.log_file.as_mut() else {
            return;
        };

        let mut header = String::new();
        header.push_str("=== RAI Session Log ===\n");
        header.push_str(&format!(
            "Started: {}\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));

        header.push_str("--- Command Line Arguments ---\n");
        for (key, value) in args {
            header.push_str(&format!("{key}: {value}\n"));
        }
        header.push('\n');

        if !agent_content.is_empty() {
            header.push_str("--- Agent File ---\n");
            header.push_str(agent_content);
            if !agent_content.ends_with('\n') {
                header.push('\n');
            }
            header.push('\n');
        }

        header.push_str("--- User Prompt ---\n");
        header.push_str(prompt);
        header.push_str("\n\n");

        header.push_str("--- Session Log ---\n");

        let _ = file.write_all(header.as_bytes());
    }

    /// Write an event to the active outputs. In silent mode only `ERR`
    /// reaches the console; all events always reach the log.
    pub fn emit(&self, kind: EventKind, text: &str) {
        let mut state = self.lock();

        if !self.silent || kind == EventKind::Err {
            let _ = writeln!(state.console, "[{kind}] {text}");
        }

        write_log_record(&mut state, kind, text);
    }

    /// Write an event only to the log file, if logging is enabled.
    pub fn emit_log(&self, kind: EventKind, text: &str) {
        let mut state = self.lock();
        write_log_record(&mut state, kind, text);
    }

    /// Write the AI prefix to the console for inline streaming.
    pub fn begin_ai_stream(&self) {
        if self.silent {
            return;
        }
        let mut state = self.lock();
        let _ = write!(state.console, "[AI] ");
        let _ = state.console.flush();
    }

    /// Write streamed AI text without a prefix or newline.
    pub fn emit_ai_chunk(&self, text: &str) {
        if self.silent {
            return;
        }
        let mut state = self.lock();
        let _ = write!(state.console, "{text}");
        let _ = state.console.flush();
    }

    /// Ensure the streamed AI output ends with a newline.
    pub fn end_ai_stream(&self, final_text: &str) {
        if self.silent {
            return;
        }
        let mut state = self.lock();
        if !final_text.ends_with('\n') {
            let _ = writeln!(state.console);
        }
    }

    /// Write the final response. It is always printed to the console,
    /// even in silent mode, and recorded in the log as an `AI` record.
    pub fn emit_final(&self, text: &str) {
        let mut state = self.lock();

        let _ = write!(state.console, "{text}");
        if !text.ends_with('\n') {
            let _ = writeln!(state.console);
        }
        let _ = state.console.flush();

        write_log_record(&mut state, EventKind::Ai, text);
    }

    /// Flush and close the log file. Safe to call multiple times;
    /// emits after close drop their log writes.
    pub fn close(&self) {
        let mut state = self.lock();
        if let Some(mut file) = state.log_file.take() {
            let _ = file.flush();
        }
    }

    /// Log file path, when logging is enabled.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.lock().log_path.clone()
    }

    /// Whether the sink is configured for silent console output.
    pub fn is_silent(&self) -> bool {
        self.silent
    }
}

fn write_log_record(state: &mut SinkState, kind: EventKind, text: &str) {
    if let Some(file) = state.log_file.as_mut() {
        let ts = Local::now().format(TIMESTAMP_FORMAT);
        let _ = writeln!(file, "[{ts}] [{kind}] {text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Console writer backed by a shared buffer for assertions.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            let guard = self.0.lock().unwrap();
            String::from_utf8_lossy(&guard).into_owned()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sink_with(silent: bool, log: bool) -> (Sink, SharedBuf, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let buf = SharedBuf::default();
        let sink = Sink::new(SinkOptions {
            silent,
            log,
            base_dir: dir.path().to_path_buf(),
            console: Box::new(buf.clone()),
        })
        .unwrap();
        (sink, buf, dir)
    }

    fn read_log(dir: &tempfile::TempDir) -> String {
        let log_dir = dir.path().join(".rai").join("log");
        let entry = std::fs::read_dir(&log_dir).unwrap().next().unwrap().unwrap();
        std::fs::read_to_string(entry.path()).unwrap()
    }

    #[test]
    fn test_emit_default_mode() {
        let (sink, buf, _dir) = sink_with(false, false);
        sink.emit(EventKind::Cmd, "echo hi");
        sink.emit(EventKind::Out, "hi");
        assert_eq!(buf.contents(), "[CMD] echo hi\n[OUT] hi\n");
    }

    #[test]
    fn test_emit_silent_only_errors() {
        let (sink, buf, _dir) = sink_with(true, false);
        sink.emit(EventKind::Ai, "thinking");
        sink.emit(EventKind::Cmd, "echo hi");
        sink.emit(EventKind::Err, "boom");
        assert_eq!(buf.contents(), "[ERR] boom\n");
    }

    #[test]
    fn test_ai_stream_helpers() {
        let (sink, buf, _dir) = sink_with(false, false);
        sink.begin_ai_stream();
        sink.emit_ai_chunk("Hello");
        sink.emit_ai_chunk(" world");
        sink.end_ai_stream("Hello world");
        assert_eq!(buf.contents(), "[AI] Hello world\n");
    }

    #[test]
    fn test_ai_stream_no_double_newline() {
        let (sink, buf, _dir) = sink_with(false, false);
        sink.begin_ai_stream();
        sink.emit_ai_chunk("done\n");
        sink.end_ai_stream("done\n");
        assert_eq!(buf.contents(), "[AI] done\n");
    }

    #[test]
    fn test_ai_stream_helpers_silent_noop() {
        let (sink, buf, _dir) = sink_with(true, false);
        sink.begin_ai_stream();
        sink.emit_ai_chunk("Hello");
        sink.end_ai_stream("Hello");
        assert_eq!(buf.contents(), "");
    }

    #[test]
    fn test_emit_final_prints_even_when_silent() {
        let (sink, buf, dir) = sink_with(true, true);
        sink.emit_final("the answer");
        assert_eq!(buf.contents(), "the answer\n");

        sink.close();
        let log = read_log(&dir);
        assert!(log.contains("[AI] the answer"));
    }

    #[test]
    fn test_log_records_have_timestamps() {
        let (sink, _buf, dir) = sink_with(false, true);
        sink.emit(EventKind::Cmd, "ls");
        sink.emit_log(EventKind::Ai, "log only");
        sink.close();

        let log = read_log(&dir);
        assert!(log.contains("] [CMD] ls"));
        assert!(log.contains("] [AI] log only"));
        // emit_log must not hit the console; covered by buf in other tests.
    }

    #[test]
    fn test_write_header_layout() {
        let (sink, _buf, dir) = sink_with(false, true);
        let mut args = BTreeMap::new();
        args.insert("log".to_string(), "true".to_string());
        args.insert("agent".to_string(), "dev.md".to_string());
        sink.write_header(&args, "agent body", "do the thing");
        sink.close();

        let log = read_log(&dir);
        assert!(log.starts_with("=== RAI Session Log ===\n"));
        let agent_pos = log.find("agent: dev.md").unwrap();
        let log_pos = log.find("log: true").unwrap();
        assert!(agent_pos < log_pos, "header args sorted by key");
        assert!(log.contains("--- Agent File ---\nagent body\n"));
        assert!(log.contains("--- User Prompt ---\ndo the thing\n"));
        assert!(log.trim_end().ends_with("--- Session Log ---"));
    }

    #[test]
    fn test_close_idempotent_and_drops_late_writes() {
        let (sink, buf, dir) = sink_with(false, true);
        sink.emit(EventKind::Ai, "before close");
        sink.close();
        sink.close();
        sink.emit(EventKind::Ai, "after close");

        let log = read_log(&dir);
        assert!(log.contains("before close"));
        assert!(!log.contains("after close"));
        // Console still works after close.
        assert!(buf.contents().contains("[AI] after close"));
    }

    #[test]
    fn test_concurrent_emits_preserve_line_integrity() {
        let (sink, buf, _dir) = sink_with(false, false);
        let sink = Arc::new(sink);

        let mut handles = Vec::new();
        for worker in 0..8 {
            let sink = sink.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    sink.emit(EventKind::Out, &format!("worker{worker}-line{i}"));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = buf.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 400);
        for line in lines {
            assert!(
                line.starts_with("[OUT] worker") && line.contains("-line"),
                "interleaved line: {line}"
            );
        }
    }
}
