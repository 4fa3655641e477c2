//! Configuration (layered: defaults < TOML file < environment).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::auth::store::default_credential_path;
use crate::auth::AuthError;

/// OAuth app id used by the Copilot editor integrations.
pub const DEFAULT_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";
pub const DEFAULT_SCOPE: &str = "read:user";
pub const DEFAULT_GITHUB_BASE_URL: &str = "https://github.com";
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 300;
pub const DEFAULT_REFRESH_LEAD_SECS: u64 = 60;

/// Endpoints, client identity, and timing for the credential lifecycle.
///
/// # Example
/// ```
/// use copilot_auth::config::AuthConfig;
///
/// let config = AuthConfig::builder()
///     .github_base_url("http://127.0.0.1:9000")
///     .token_path("/tmp/copilot-auth/github_token")
///     .build();
/// assert_eq!(config.device_code_url(), "http://127.0.0.1:9000/login/device/code");
/// assert_eq!(config.refresh_buffer().as_secs(), 300);
/// ```
#[derive(Clone, Builder, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[builder(into, default = DEFAULT_CLIENT_ID.to_string())]
    pub client_id: String,
    #[builder(into, default = DEFAULT_SCOPE.to_string())]
    pub scope: String,
    /// Host of the device authorization endpoints.
    #[builder(into, default = DEFAULT_GITHUB_BASE_URL.to_string())]
    pub github_base_url: String,
    /// Host of the identity and token exchange endpoints.
    #[builder(into, default = DEFAULT_API_BASE_URL.to_string())]
    pub api_base_url: String,
    #[builder(into, default = default_user_agent())]
    pub user_agent: String,
    #[builder(into, default = default_credential_path())]
    pub token_path: PathBuf,
    #[builder(default = DEFAULT_REFRESH_BUFFER_SECS)]
    pub refresh_buffer_secs: u64,
    #[builder(default = DEFAULT_REFRESH_LEAD_SECS)]
    pub refresh_lead_secs: u64,
    /// Externally supplied primary credential. Bypasses the store and the
    /// device flow.
    #[builder(into)]
    pub github_token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .field("github_base_url", &self.github_base_url)
            .field("api_base_url", &self.api_base_url)
            .field("user_agent", &self.user_agent)
            .field("token_path", &self.token_path)
            .field("refresh_buffer_secs", &self.refresh_buffer_secs)
            .field("refresh_lead_secs", &self.refresh_lead_secs)
            .field("github_token", &self.github_token.as_ref().map(|_| ".."))
            .finish()
    }
}

impl AuthConfig {
    /// Defaults overlaid with environment variables (`.env` honored).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, AuthError> {
        Ok(toml::from_str(raw)?)
    }

    /// Load a TOML file, or defaults when the file does not exist.
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw).map_err(|err| {
                AuthError::Configuration(format!("{}: {err}", path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = non_empty("COPILOT_AUTH_CLIENT_ID") {
            self.client_id = value;
        }
        if let Some(value) = non_empty("COPILOT_AUTH_SCOPE") {
            self.scope = value;
        }
        if let Some(value) = non_empty("COPILOT_AUTH_GITHUB_BASE_URL") {
            self.github_base_url = value;
        }
        if let Some(value) = non_empty("COPILOT_AUTH_API_BASE_URL") {
            self.api_base_url = value;
        }
        if let Some(value) = non_empty("COPILOT_AUTH_USER_AGENT") {
            self.user_agent = value;
        }
        if let Some(value) = non_empty("COPILOT_AUTH_TOKEN_PATH") {
            self.token_path = PathBuf::from(value);
        }
        if let Some(value) = non_empty("GH_TOKEN") {
            self.github_token = Some(value.trim().to_string());
        }
    }

    pub fn device_code_url(&self) -> String {
        join_url(&self.github_base_url, "login/device/code")
    }

    pub fn access_token_url(&self) -> String {
        join_url(&self.github_base_url, "login/oauth/access_token")
    }

    pub fn user_url(&self) -> String {
        join_url(&self.api_base_url, "user")
    }

    pub fn copilot_token_url(&self) -> String {
        join_url(&self.api_base_url, "copilot_internal/v2/token")
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    pub fn refresh_lead(&self) -> Duration {
        Duration::from_secs(self.refresh_lead_secs)
    }

    /// HTTP client shared by every endpoint; GitHub rejects requests without
    /// a user agent.
    pub fn http_client(&self) -> Result<reqwest::Client, AuthError> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|err| AuthError::Configuration(format!("HTTP client: {err}")))
    }
}

/// `<platform config dir>/copilot-auth/config.toml`.
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "copilot-auth")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".copilot-auth").join("config.toml"))
}

fn default_user_agent() -> String {
    format!("copilot-auth/{}", env!("CARGO_PKG_VERSION"))
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}
