//! Provider error taxonomy and HTTP error normalization.
//!
//! Every adapter HTTP failure is normalized into the `Http` variant so
//! the CLI can display consistent, actionable messages regardless of
//! which backend handled the request.

/// Errors surfaced by provider construction, transport, and streaming.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    // === Construction sentinels (no HTTP involved) ===
    #[error(
        "no provider configured: set endpoint, api-key, and model via 'rai config' or environment variables"
    )]
    NoProvider,

    #[error("authentication required: set api-key via 'rai config api-key <key>' or RAI_API_KEY")]
    AuthRequired,

    #[error("model required: set model via 'rai config model <name>' or RAI_MODEL")]
    ModelRequired,

    #[error("GitHub Copilot token required: authenticate with 'rai copilot-login' or set api-key")]
    CopilotTokenRequired,

    #[error("enterprise-url required: set it via 'rai config enterprise-url <domain>'")]
    EnterpriseUrlRequired,

    // === Normalized HTTP failures ===
    #[error("{}", format_http(.provider, .message, .guidance))]
    Http {
        status: u16,
        provider: &'static str,
        message: String,
        guidance: String,
    },

    // === Everything else ===
    /// Request could not be sent or the connection failed.
    #[error("{provider} request: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    /// The provider returned 200 but the body carried an error object.
    #[error("{provider} error: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    /// Mid-stream failure; delivered in-band as a stream event.
    #[error("{0}")]
    Stream(String),

    /// Device-code authentication failure.
    #[error("{0}")]
    DeviceFlow(String),

    #[error("operation cancelled")]
    Cancelled,
}

fn format_http(provider: &str, message: &str, guidance: &str) -> String {
    if guidance.is_empty() {
        format!("{provider}: {message}")
    } else {
        format!("{provider}: {message} — {guidance}")
    }
}

impl ProviderError {
    /// Normalize a raw HTTP status and response body into actionable
    /// operator guidance.
    pub fn from_http_status(provider: &'static str, status: u16, body: &str) -> Self {
        let (message, guidance) = match status {
            401 => (
                "authentication failed".to_string(),
                "verify your API key with 'rai config api-key <key>' or set RAI_API_KEY"
                    .to_string(),
            ),
            403 => (
                "access denied".to_string(),
                "check your API key permissions and account status".to_string(),
            ),
            404 => (
                "endpoint or model not found".to_string(),
                "verify your endpoint with 'rai config endpoint <url>' and model with 'rai config model <name>'"
                    .to_string(),
            ),
            429 => (
                "rate limited".to_string(),
                "wait a moment and try again, or check your usage quota".to_string(),
            ),
            s if s >= 500 => (
                format!("server error (HTTP {s})"),
                "the provider may be experiencing issues; try again shortly".to_string(),
            ),
            s => {
                let mut message = format!("unexpected error (HTTP {s})");
                if !body.is_empty() {
                    message.push_str(": ");
                    message.push_str(&truncate_chars(body, 200));
                }
                (message, String::new())
            }
        };
        Self::Http {
            status,
            provider,
            message,
            guidance,
        }
    }

    /// Copilot-specific overlay on the normalization table: 401 directs
    /// to the login subcommand; a 403 whose body says the model is "not
    /// supported" becomes a model-availability message.
    pub fn from_copilot_status(status: u16, body: &str) -> Self {
        let mut err = Self::from_http_status("github-copilot", status, body);
        if let Self::Http {
            message, guidance, ..
        } = &mut err
        {
            match status {
                401 => {
                    *guidance = "re-authenticate with 'rai copilot-login' or check your GitHub token"
                        .to_string();
                }
                403 if body.contains("not supported") => {
                    *message = "model not available".to_string();
                    *guidance =
                        "enable the model at https://github.com/settings/copilot/features"
                            .to_string();
                }
                403 => {
                    *guidance =
                        "re-authenticate with 'rai copilot-login' or verify your Copilot subscription"
                            .to_string();
                }
                _ => {}
            }
        }
        err
    }

    /// HTTP status code for normalized HTTP failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Provider name for normalized HTTP failures.
    pub fn provider(&self) -> Option<&'static str> {
        match self {
            Self::Http { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Api { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
