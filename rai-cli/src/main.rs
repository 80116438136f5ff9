//! rai - terminal AI agent CLI.
//!
//! Sends a prompt to a configured LLM backend, streams the response to
//! the console, and lets the model drive terminal commands and skills
//! until it produces a final answer.

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use rai_client::debug::{LOG_LEVEL_KEY, LOG_PATH_KEY};
use rai_client::{device_auth, load_token, normalize_domain, save_token};
use rai_core::agent::{self, AgentFile};
use rai_core::config::{self, SettingsMap};
use rai_session::{EventKind, SessionConfig, Sink, SinkOptions};
use rai_skills::{discover, format_list};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const EXIT_SUCCESS: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[derive(Parser)]
#[command(name = "rai", version, about = "Run AI prompts against configurable LLM backends")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a prompt (default when no subcommand is given)
    Run(RunArgs),
    /// Persist one configuration entry in .rai/config
    Config { key: String, value: String },
    /// Inspect discovered skills
    Skills {
        #[command(subcommand)]
        command: SkillsCommand,
    },
    /// Authenticate with GitHub Copilot via the device-code flow
    CopilotLogin { domain: Option<String> },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Prompt text; multiple words are joined with spaces
    prompt: Vec<String>,

    /// Agent file providing a system prompt and settings
    #[arg(long, value_name = "FILE")]
    agent: Option<PathBuf>,

    /// Read the prompt from a file (UTF-8, trailing newlines stripped)
    #[arg(long, value_name = "FILE")]
    prompt_file: Option<PathBuf>,

    /// Only errors and the final response reach the console
    #[arg(long)]
    silent: bool,

    /// Write a session log; --log=DEBUG also captures HTTP bodies
    #[arg(
        long,
        value_name = "LEVEL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    log: Option<String>,
}

#[derive(Subcommand)]
enum SkillsCommand {
    /// List discovered skills
    List,
}

/// Inject `run` as the default subcommand when the first positional
/// argument is not a known subcommand, so `rai "hello"` works like
/// `rai run "hello"`.
fn inject_default_run_subcommand(
    args: impl IntoIterator<Item = std::ffi::OsString>,
) -> Vec<std::ffi::OsString> {
    const SUBCOMMANDS: &[&str] = &["run", "config", "skills", "copilot-login", "help"];
    // Global flags that consume the next argument as a value.
    const FLAGS_WITH_VALUE: &[&str] = &["--agent", "--prompt-file"];

    let args: Vec<std::ffi::OsString> = args.into_iter().collect();
    let mut i = 1; // skip binary name
    while i < args.len() {
        let arg_str = args[i].to_str().unwrap_or("");
        if arg_str.starts_with('-') {
            if FLAGS_WITH_VALUE.contains(&arg_str) {
                i += 2;
            } else {
                i += 1;
            }
        } else {
            if !SUBCOMMANDS.contains(&arg_str) {
                let mut patched = args[..i].to_vec();
                patched.push("run".into());
                patched.extend_from_slice(&args[i..]);
                return patched;
            }
            return args;
        }
    }
    args
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = inject_default_run_subcommand(std::env::args_os());
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    EXIT_SUCCESS
                }
                _ => EXIT_USAGE,
            };
            return ExitCode::from(code);
        }
    };

    let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let code = match cli.command {
        Command::Run(args) => run_prompt(args, &base_dir).await,
        Command::Config { key, value } => run_config(&key, &value, &base_dir).await,
        Command::Skills {
            command: SkillsCommand::List,
        } => run_skills_list(&base_dir),
        Command::CopilotLogin { domain } => run_copilot_login(domain, &base_dir).await,
    };
    ExitCode::from(code)
}

async fn run_prompt(args: RunArgs, base_dir: &Path) -> u8 {
    let mut prompt = args.prompt.join(" ").trim().to_string();

    if !prompt.is_empty() && args.prompt_file.is_some() {
        eprintln!("prompt error: provide either a prompt string or --prompt-file, not both");
        return EXIT_USAGE;
    }
    if prompt.is_empty() && args.prompt_file.is_none() {
        eprintln!("{}", Cli::command().render_usage());
        return EXIT_USAGE;
    }
    if let Some(path) = &args.prompt_file {
        match load_prompt_file(path) {
            Ok(loaded) => prompt = loaded,
            Err(err) => {
                eprintln!("prompt error: {err:#}");
                return EXIT_ERROR;
            }
        }
    }

    let log_enabled = args.log.is_some();
    let debug_log = args
        .log
        .as_deref()
        .is_some_and(|level| level.eq_ignore_ascii_case("DEBUG"));

    let sink = match Sink::new(SinkOptions {
        silent: args.silent,
        log: log_enabled,
        base_dir: base_dir.to_path_buf(),
        console: Box::new(std::io::stdout()),
    }) {
        Ok(sink) => Arc::new(sink),
        Err(err) => {
            eprintln!("output error: {err}");
            return EXIT_ERROR;
        }
    };

    let agent = if let Some(path) = &args.agent {
        match agent::parse_file(path) {
            Ok(agent) => agent,
            Err(err) => {
                eprintln!("agent error: {err}");
                return EXIT_ERROR;
            }
        }
    } else {
        AgentFile::default()
    };
    for warning in &agent.warnings {
        sink.emit(EventKind::Err, warning);
    }

    let mut header_args = BTreeMap::new();
    if let Some(path) = &args.agent {
        header_args.insert("agent".to_string(), path.display().to_string());
    }
    if let Some(path) = &args.prompt_file {
        header_args.insert("prompt-file".to_string(), path.display().to_string());
    }
    if args.silent {
        header_args.insert("silent".to_string(), "true".to_string());
    }
    if log_enabled {
        header_args.insert("log".to_string(), "true".to_string());
    }
    if debug_log {
        header_args.insert("log-level".to_string(), "DEBUG".to_string());
    }
    sink.write_header(&header_args, &agent.system_prompt, &prompt);

    if let Some(log_path) = sink.log_path() {
        eprintln!("log: {}", log_path.display());
    }

    // Merge configuration: defaults < env < file < agent < cli.
    let mut merged = match config::load_merged(
        base_dir,
        &agent.settings,
        &SettingsMap::new(),
        &SettingsMap::new(),
    ) {
        Ok(merged) => merged,
        Err(err) => {
            eprintln!("config error: {err}");
            return EXIT_ERROR;
        }
    };

    // Let adapters append raw HTTP bodies to the session log when
    // `--log=DEBUG` is in effect and a log file exists.
    if debug_log {
        if let Some(log_path) = sink.log_path() {
            merged.insert(LOG_LEVEL_KEY.to_string(), "DEBUG".to_string());
            merged.insert(LOG_PATH_KEY.to_string(), log_path.display().to_string());
        }
    }

    // Load a stored Copilot token when the provider is a Copilot variant
    // and no key was configured.
    let provider_id = merged.get("provider").cloned().unwrap_or_default();
    if (provider_id == "github-copilot" || provider_id == "github-copilot-enterprise")
        && merged.get("api-key").is_none_or(|v| v.is_empty())
        && merged.get("api_key").is_none_or(|v| v.is_empty())
    {
        if let Some(token) = load_token(base_dir) {
            merged.insert("api-key".to_string(), token);
        }
    }

    let provider = match rai_client::resolve(&merged) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("provider error: {err}");
            return EXIT_ERROR;
        }
    };

    let (skills, skill_warnings) = discover(base_dir).unwrap_or_default();
    for warning in &skill_warnings {
        sink.emit(EventKind::Err, warning);
    }

    let result = rai_session::run(SessionConfig {
        provider,
        sink: sink.clone(),
        system_prompt: agent.system_prompt.clone(),
        user_prompt: prompt,
        skills,
        base_dir: base_dir.to_path_buf(),
    })
    .await;

    sink.close();

    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            eprintln!("session error: {err}");
            EXIT_ERROR
        }
    }
}

async fn run_config(key: &str, value: &str, base_dir: &Path) -> u8 {
    let key = key.trim();

    // Selecting a Copilot provider runs the device flow first so the
    // persisted configuration is immediately usable.
    if key == "provider" && (value == "github-copilot" || value == "github-copilot-enterprise") {
        if let Err(err) = configure_copilot_provider(value, base_dir).await {
            eprintln!("config error: {err:#}");
            return EXIT_ERROR;
        }
        println!("config updated");
        return EXIT_SUCCESS;
    }

    match config::set(base_dir, key, value) {
        Ok(()) => {
            println!("config updated");
            EXIT_SUCCESS
        }
        Err(err) => {
            eprintln!("config error: {err}");
            EXIT_ERROR
        }
    }
}

fn run_skills_list(base_dir: &Path) -> u8 {
    match discover(base_dir) {
        Ok((skills, warnings)) => {
            for warning in &warnings {
                eprintln!("warning: {warning}");
            }
            println!("{}", format_list(&skills));
            EXIT_SUCCESS
        }
        Err(err) => {
            eprintln!("skills error: {err}");
            EXIT_ERROR
        }
    }
}

async fn run_copilot_login(domain: Option<String>, base_dir: &Path) -> u8 {
    let domain = domain.unwrap_or_else(|| "github.com".to_string());
    if authenticate_copilot(&domain, base_dir).await.is_err() {
        return EXIT_ERROR;
    }

    // Persist provider selection.
    let mut provider_id = "github-copilot";
    if !domain.is_empty() && domain != "github.com" {
        provider_id = "github-copilot-enterprise";
        let _ = config::set(base_dir, "enterprise-url", &domain);
    }
    let _ = config::set(base_dir, "provider", provider_id);
    EXIT_SUCCESS
}

async fn configure_copilot_provider(provider_id: &str, base_dir: &Path) -> anyhow::Result<()> {
    let domain = if provider_id == "github-copilot-enterprise" {
        let values = config::load(base_dir)?;
        let domain = values
            .get("enterprise-url")
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        if domain.is_empty() {
            anyhow::bail!("enterprise-url must be set before configuring github-copilot-enterprise");
        }
        domain
    } else {
        "github.com".to_string()
    };

    authenticate_copilot(&domain, base_dir).await?;

    if provider_id == "github-copilot-enterprise" {
        let _ = config::set(base_dir, "enterprise-url", &domain);
    }
    config::set(base_dir, "provider", provider_id)?;
    Ok(())
}

async fn authenticate_copilot(domain: &str, base_dir: &Path) -> anyhow::Result<()> {
    let mut domain = normalize_domain(domain);
    if domain.is_empty() {
        domain = "github.com".to_string();
    }

    // Ctrl-C aborts the polling loop.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let mut stdout = std::io::stdout();
    let auth = match device_auth(&domain, &mut stdout, &cancel).await {
        Ok(auth) => auth,
        Err(err) => {
            eprintln!("authentication failed: {err}");
            return Err(err.into());
        }
    };

    if let Err(err) = save_token(base_dir, &auth.token) {
        eprintln!("saving token: {err}");
        return Err(err.into());
    }

    println!("authenticated successfully");
    Ok(())
}

fn load_prompt_file(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str().is_empty() {
        anyhow::bail!("prompt file path is empty");
    }
    let meta = std::fs::metadata(path).context("prompt file")?;
    if meta.is_dir() {
        anyhow::bail!("prompt file {} is a directory", path.display());
    }
    let data = std::fs::read(path).context("prompt file")?;
    if data.contains(&0) {
        anyhow::bail!("prompt file {} is not valid UTF-8 text", path.display());
    }
    let text = String::from_utf8(data)
        .map_err(|_| anyhow::anyhow!("prompt file {} is not valid UTF-8 text", path.display()))?;
    Ok(text.trim_end_matches('\n').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<std::ffi::OsString> {
        list.iter().map(|s| s.into()).collect()
    }

    #[test]
    fn test_inject_run_for_bare_prompt() {
        let patched = inject_default_run_subcommand(args(&["rai", "hello", "world"]));
        assert_eq!(patched, args(&["rai", "run", "hello", "world"]));
    }

    #[test]
    fn test_inject_run_preserves_known_subcommands() {
        let patched = inject_default_run_subcommand(args(&["rai", "config", "model", "gpt-4"]));
        assert_eq!(patched, args(&["rai", "config", "model", "gpt-4"]));

        let patched = inject_default_run_subcommand(args(&["rai", "skills", "list"]));
        assert_eq!(patched, args(&["rai", "skills", "list"]));
    }

    #[test]
    fn test_inject_run_skips_value_flags() {
        let patched =
            inject_default_run_subcommand(args(&["rai", "--agent", "dev.md", "do", "it"]));
        assert_eq!(patched, args(&["rai", "--agent", "dev.md", "run", "do", "it"]));
    }

    #[test]
    fn test_inject_run_with_boolean_flags() {
        let patched = inject_default_run_subcommand(args(&["rai", "--silent", "hi"]));
        assert_eq!(patched, args(&["rai", "--silent", "run", "hi"]));

        let patched = inject_default_run_subcommand(args(&["rai", "--log=DEBUG", "hi"]));
        assert_eq!(patched, args(&["rai", "--log=DEBUG", "run", "hi"]));
    }

    #[test]
    fn test_inject_run_no_positionals() {
        let patched = inject_default_run_subcommand(args(&["rai", "--silent"]));
        assert_eq!(patched, args(&["rai", "--silent"]));
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from(args(&[
            "rai",
            "run",
            "--silent",
            "--log=DEBUG",
            "summarize",
            "this",
        ]))
        .unwrap();
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert!(run.silent);
        assert_eq!(run.log.as_deref(), Some("DEBUG"));
        assert_eq!(run.prompt, vec!["summarize", "this"]);
    }

    #[test]
    fn test_cli_log_without_level() {
        let cli = Cli::try_parse_from(args(&["rai", "run", "--log", "hi"])).unwrap();
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.log.as_deref(), Some(""));
        assert_eq!(run.prompt, vec!["hi"]);
    }

    #[test]
    fn test_load_prompt_file_strips_trailing_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "what is 2+2?\n\n").unwrap();
        assert_eq!(load_prompt_file(&path).unwrap(), "what is 2+2?");
    }

    #[test]
    fn test_load_prompt_file_rejects_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.bin");
        std::fs::write(&path, b"abc\x00def").unwrap();
        assert!(load_prompt_file(&path).is_err());
    }

    #[test]
    fn test_load_prompt_file_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_prompt_file(dir.path()).is_err());
    }
}
