use thiserror::Error;

/// Failures surfaced by the credential lifecycle.
///
/// `Clone` so a single initialization outcome can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Device code expired")]
    Expired,
    #[error("Access denied")]
    Denied,
    #[error("Timed out waiting for authorization")]
    Timeout,
    #[error("Cancelled")]
    Cancelled,
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
    #[error("Token exchange failed: {0}")]
    Exchange(String),
    #[error("No service token available")]
    TokenUnavailable,
    #[error("Background refresh failed: {0}")]
    RefreshFailure(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    pub(crate) fn server(status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        Self::Server {
            status: status.as_u16(),
            message: message.into(),
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Server { .. } | Self::RefreshFailure(_)
        )
    }

    /// Whether this ends a device flow for good (a new attempt is needed).
    pub fn is_terminal_device_outcome(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::Denied | Self::Timeout | Self::Cancelled
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Configuration(error.to_string())
    }
}
