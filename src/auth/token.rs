use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

pub(crate) const DEFAULT_COPILOT_API_BASE_URL: &str = "https://api.individual.githubcopilot.com";

/// Long-lived GitHub OAuth token.
///
/// Only ever used to verify identity and to mint [`ServiceToken`]s. `Debug`
/// output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct PrimaryCredential(String);

impl PrimaryCredential {
    /// Wrap a raw token, trimming surrounding whitespace.
    ///
    /// Returns `None` for empty or whitespace-only input.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub(crate) fn authorization_header(&self) -> String {
        format!("token {}", self.0)
    }
}

impl fmt::Debug for PrimaryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrimaryCredential").field(&"<redacted>").finish()
    }
}

/// Short-lived Copilot API token.
///
/// # Example
/// ```
/// use chrono::{Duration, Utc};
/// use copilot_auth::auth::ServiceToken;
///
/// let token = ServiceToken {
///     token: "tid=1;exp=2;proxy-ep=proxy.individual.githubcopilot.com".to_string(),
///     expires_at: Utc::now() + Duration::minutes(30),
///     refresh_in: 1500,
/// };
/// assert!(!token.expires_within(std::time::Duration::from_secs(300)));
/// assert_eq!(token.api_base_url(), "https://api.individual.githubcopilot.com");
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Seconds after issue at which the server suggests refreshing.
    pub refresh_in: u64,
}

impl ServiceToken {
    /// Time left before `expires_at`, zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn remaining(&self) -> Duration {
        self.remaining_at(Utc::now())
    }

    /// True when less than `buffer` remains before expiry.
    pub fn expires_within(&self, buffer: Duration) -> bool {
        self.remaining() < buffer
    }

    /// Copilot API host advertised by the token's `proxy-ep` field.
    pub fn api_base_url(&self) -> String {
        derive_api_base_url(&self.token)
            .unwrap_or_else(|| DEFAULT_COPILOT_API_BASE_URL.to_string())
    }
}

impl fmt::Debug for ServiceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("refresh_in", &self.refresh_in)
            .finish()
    }
}

/// Accepts epoch seconds as a number or numeric string. Millisecond values
/// are normalized to seconds.
pub(crate) fn parse_expires_at(value: &serde_json::Value) -> Result<DateTime<Utc>, AuthError> {
    let raw = match value {
        serde_json::Value::Number(num) => num.as_i64(),
        serde_json::Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AuthError::Exchange("expires_at missing or invalid".to_string()))?;
    let secs = if raw > 10_000_000_000 { raw / 1000 } else { raw };
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::Exchange(format!("expires_at out of range: {raw}")))
}

fn derive_api_base_url(token: &str) -> Option<String> {
    let proxy = token.split(';').find_map(|part| {
        let part = part.trim();
        if part.to_ascii_lowercase().starts_with("proxy-ep=") {
            Some(part["proxy-ep=".len()..].trim().to_string())
        } else {
            None
        }
    })?;
    let host = proxy
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .replacen("proxy.", "api.", 1);
    if host.is_empty() {
        return None;
    }
    Some(format!("https://{host}"))
}
