//! Terminal command execution.
//!
//! Commands run under `sh -c` (POSIX) or `cmd.exe /C` (Windows, after a
//! small `ls` → `dir` compatibility rewrite) with a bounded deadline.
//! Output captured before a timeout or failure is preserved.

use crate::error::ToolError;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Deadline applied to every terminal invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Parsed arguments of the `terminal` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalArgs {
    #[serde(default)]
    pub command: String,
}

/// Parse terminal tool arguments: a JSON object first, then a bare JSON
/// string treated as the command.
pub fn parse_terminal_args(raw: &str) -> Result<TerminalArgs, ToolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ToolError::MissingCommand);
    }

    let mut args = match serde_json::from_str::<TerminalArgs>(trimmed) {
        Ok(args) => args,
        Err(err) => match serde_json::from_str::<String>(trimmed) {
            Ok(command) => TerminalArgs { command },
            Err(_) => return Err(ToolError::InvalidArguments(err.to_string())),
        },
    };

    args.command = args.command.trim().to_string();
    if args.command.is_empty() {
        return Err(ToolError::MissingCommand);
    }
    Ok(args)
}

/// Rewrite a leading `ls` invocation into `dir` for cmd.exe.
///
/// `-a…` flags map to `/a`; positional paths are preserved; other flags
/// are dropped. Non-`ls` commands pass through untouched.
pub fn rewrite_ls_for_cmd(command: &str) -> String {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return command.to_string();
    }

    let mut fields = trimmed.split_whitespace();
    let Some(first) = fields.next() else {
        return command.to_string();
    };
    if !first.eq_ignore_ascii_case("ls") {
        return command.to_string();
    }

    let mut show_all = false;
    let mut paths = Vec::new();
    for field in fields {
        if let Some(flags) = field.strip_prefix('-') {
            if flags.contains('a') {
                show_all = true;
            }
            continue;
        }
        paths.push(field);
    }

    let mut rewritten = String::from("dir");
    if show_all {
        rewritten.push_str(" /a");
    }
    if !paths.is_empty() {
        rewritten.push(' ');
        rewritten.push_str(&paths.join(" "));
    }
    rewritten
}

/// Run a command on the platform shell with the given deadline.
///
/// Returns combined stdout and stderr. On timeout the subprocess is
/// killed and whatever output was captured so far rides along in the
/// error.
pub async fn run_terminal_command(
    command: &str,
    work_dir: &Path,
    timeout: Duration,
) -> Result<String, ToolError> {
    let mut cmd = build_shell_command(command);
    cmd.current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(command, "executing terminal command");

    let mut child = cmd.spawn().map_err(|err| ToolError::Spawn(err.to_string()))?;

    // Pump pipes into shared buffers so a chatty child never blocks on a
    // full pipe buffer and partial output survives a kill even when a
    // grandchild keeps the pipe open.
    let stdout_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf = Arc::new(Mutex::new(Vec::new()));
    let stdout_task = tokio::spawn(pump_pipe(child.stdout.take(), stdout_buf.clone()));
    let stderr_task = tokio::spawn(pump_pipe(child.stderr.take(), stderr_buf.clone()));

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(err)) => {
            let _ = child.start_kill();
            return Err(ToolError::Spawn(err.to_string()));
        }
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            None
        }
    };

    match status {
        Some(_) => {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
        }
        None => {
            // Pipes may stay open past the kill; bound the drain.
            const KILL_GRACE: Duration = Duration::from_millis(500);
            if tokio::time::timeout(KILL_GRACE, stdout_task).await.is_err()
                || tokio::time::timeout(KILL_GRACE, stderr_task).await.is_err()
            {
                tracing::debug!(command, "output pipes still open after kill");
            }
        }
    }

    let mut output = String::from_utf8_lossy(&take_buf(&stdout_buf)).into_owned();
    output.push_str(&String::from_utf8_lossy(&take_buf(&stderr_buf)));

    match status {
        None => Err(ToolError::Timeout { output }),
        Some(status) if !status.success() => Err(ToolError::CommandFailed {
            reason: describe_status(status),
            output,
        }),
        Some(_) => Ok(output),
    }
}

async fn pump_pipe<R>(pipe: Option<R>, sink: Arc<Mutex<Vec<u8>>>)
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let Some(mut pipe) = pipe else {
        return;
    };
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                let mut guard = sink.lock().unwrap_or_else(|e| e.into_inner());
                guard.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

fn take_buf(buf: &Arc<Mutex<Vec<u8>>>) -> Vec<u8> {
    let mut guard = buf.lock().unwrap_or_else(|e| e.into_inner());
    std::mem::take(&mut *guard)
}

#[cfg(windows)]
fn build_shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd.exe");
    cmd.arg("/C").arg(rewrite_ls_for_cmd(command));
    cmd
}

#[cfg(not(windows))]
fn build_shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

fn describe_status(status: std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}
