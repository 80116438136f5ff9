//! GitHub Copilot OAuth 2.0 Device Authorization Grant (RFC 8628).
//!
//! The flow displays a short user code and verification URL, opens the
//! default browser, and polls the token endpoint until the user approves
//! or the surrounding context is cancelled. `slow_down` responses back
//! off per RFC 8628 §3.5. The resulting token is persisted under the
//! working-directory state folder with owner-only permissions.

use crate::error::ProviderError;
use rai_core::RAI_DIR;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const COPILOT_CLIENT_ID: &str = "Ov23lihVA6IPSeMxp4BB";
const COPILOT_SCOPE: &str = "read:user";
const DEFAULT_COPILOT_BASE_URL: &str = "https://api.githubcopilot.com";
const TOKEN_FILE_NAME: &str = "copilot-token";
/// Jitter margin added to every polling sleep.
const POLL_MARGIN: Duration = Duration::from_millis(500);

/// Result of a successful GitHub Copilot authentication.
#[derive(Debug, Clone)]
pub struct CopilotAuth {
    pub token: String,
    /// Empty for github.com.
    pub enterprise_url: String,
}

/// Strip protocol, port, and trailing slashes from a URL or domain
/// string. `https://company.ghe.com/` becomes `company.ghe.com`.
pub fn normalize_domain(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    match reqwest::Url::parse(&with_scheme) {
        Ok(url) => match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => trimmed.trim_end_matches('/').to_string(),
        },
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

/// Copilot API base URL for the given enterprise domain. Empty or
/// `github.com` selects the public endpoint; anything else builds
/// `https://copilot-api.{domain}`.
pub fn copilot_base_url(enterprise_url: &str) -> String {
    if enterprise_url.is_empty() {
        return DEFAULT_COPILOT_BASE_URL.to_string();
    }
    let domain = normalize_domain(enterprise_url);
    if domain.is_empty() || domain == "github.com" {
        return DEFAULT_COPILOT_BASE_URL.to_string();
    }
    format!("https://copilot-api.{domain}")
}

/// OAuth device-code and access-token endpoints for a domain.
fn oauth_urls(domain: &str) -> (String, String) {
    if domain.is_empty() || domain == "github.com" {
        (
            "https://github.com/login/device/code".to_string(),
            "https://github.com/login/oauth/access_token".to_string(),
        )
    } else {
        (
            format!("https://{domain}/login/device/code"),
            format!("https://{domain}/login/oauth/access_token"),
        )
    }
}

/// Polling interval after a `slow_down` response: the server-supplied
/// interval when positive, else the previous interval plus five seconds.
fn next_poll_interval(current_secs: u64, server_secs: u64) -> u64 {
    if server_secs > 0 {
        server_secs
    } else {
        current_secs + 5
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    #[serde(default)]
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: String,
    #[serde(default)]
    user_code: String,
    #[serde(default)]
    device_code: String,
    #[serde(default)]
    interval: u64,
}

#[derive(Debug, Deserialize)]
struct TokenPollResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    error: String,
    #[serde(default)]
    interval: u64,
}

/// Run the device-code flow for `domain`, writing instructions to `out`.
/// Blocks until the user completes authentication, an error occurs, or
/// `cancel` fires.
pub async fn device_auth(
    domain: &str,
    out: &mut (dyn Write + Send),
    cancel: &CancellationToken,
) -> Result<CopilotAuth, ProviderError> {
    let (device_url, token_url) = oauth_urls(domain);
    device_auth_with_endpoints(&device_url, &token_url, domain, out, cancel).await
}

/// Same flow with explicit endpoints. Exists so tests can run the whole
/// exchange against a local server.
#[doc(hidden)]
pub async fn device_auth_with_endpoints(
    device_url: &str,
    token_url: &str,
    domain: &str,
    out: &mut (dyn Write + Send),
    cancel: &CancellationToken,
) -> Result<CopilotAuth, ProviderError> {
    let client = reqwest::Client::new();

    let payload = serde_json::json!({
        "client_id": COPILOT_CLIENT_ID,
        "scope": COPILOT_SCOPE,
    });
    let response = client
        .post(device_url)
        .header("Accept", "application/json")
        .json(&payload)
        .send()
        .await
        .map_err(|err| ProviderError::DeviceFlow(format!("device code request: {err}")))?;

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    if status != 200 {
        return Err(ProviderError::DeviceFlow(format!(
            "device code request failed (HTTP {status}): {body}"
        )));
    }
    let device: DeviceCodeResponse = serde_json::from_str(&body)
        .map_err(|err| ProviderError::DeviceFlow(format!("parsing device response: {err}")))?;

    let verification_url = if device.verification_uri_complete.is_empty() {
        &device.verification_uri
    } else {
        &device.verification_uri_complete
    };
    if !verification_url.is_empty() && webbrowser::open(verification_url).is_ok() {
        let _ = writeln!(out, "Opening browser for authentication...");
    }
    let _ = writeln!(
        out,
        "Open {} and enter code: {}",
        device.verification_uri, device.user_code
    );
    let _ = writeln!(out, "Waiting for authentication...");

    let mut interval_secs = if device.interval < 1 { 5 } else { device.interval };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs(interval_secs) + POLL_MARGIN) => {}
        }

        let payload = serde_json::json!({
            "client_id": COPILOT_CLIENT_ID,
            "device_code": device.device_code,
            "grant_type": "urn:ietf:params:oauth:grant-type:device_code",
        });
        let response = client
            .post(token_url)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::DeviceFlow(format!("token poll: {err}")))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if status != 200 {
            return Err(ProviderError::DeviceFlow(format!(
                "token request failed (HTTP {status}): {body}"
            )));
        }
        let token: TokenPollResponse = serde_json::from_str(&body)
            .map_err(|err| ProviderError::DeviceFlow(format!("parsing token response: {err}")))?;

        if !token.access_token.is_empty() {
            return Ok(CopilotAuth {
                token: token.access_token,
                enterprise_url: domain.to_string(),
            });
        }

        match token.error.as_str() {
            "authorization_pending" | "" => continue,
            "slow_down" => {
                interval_secs = next_poll_interval(interval_secs, token.interval);
                continue;
            }
            other => {
                return Err(ProviderError::DeviceFlow(format!(
                    "authentication failed: {other}"
                )));
            }
        }
    }
}

fn token_path(base_dir: &Path) -> PathBuf {
    base_dir.join(RAI_DIR).join(TOKEN_FILE_NAME)
}

/// Read a stored Copilot token, if any.
pub fn load_token(base_dir: &Path) -> Option<String> {
    let data = std::fs::read_to_string(token_path(base_dir)).ok()?;
    let token = data.trim().to_string();
    if token.is_empty() { None } else { Some(token) }
}

/// Persist a Copilot token (file mode 0600, state dir 0700).
pub fn save_token(base_dir: &Path, token: &str) -> std::io::Result<()> {
    let dir = base_dir.join(RAI_DIR);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&dir)?;

        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(token_path(base_dir))?;
        file.write_all(token.as_bytes())?;
        file.write_all(b"\n")?;
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(&dir)?;
        std::fs::write(token_path(base_dir), format!("{token}\n"))?;
    }

    Ok(())
}
