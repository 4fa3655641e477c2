use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use super::error::AuthError;
use super::token::PrimaryCredential;
use crate::config::AuthConfig;

const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Device authorization issued by the server for one login attempt.
///
/// # Example
/// ```
/// use copilot_auth::auth::DeviceCodeSession;
///
/// let session = DeviceCodeSession {
///     device_code: "3584d83530557fdd1f46af8289938c8ef79f9dc5".to_string(),
///     user_code: "WDJB-MJHT".to_string(),
///     verification_uri: "https://github.com/login/device".to_string(),
///     expires_in: 900,
///     interval: 5,
/// };
/// assert_eq!(session.max_attempts(), 150);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCodeSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Lifetime of the device code, in seconds.
    pub expires_in: u64,
    /// Minimum polling interval, in seconds.
    pub interval: u64,
}

impl DeviceCodeSession {
    /// Wait before the first re-poll: one second over the server minimum.
    pub fn initial_wait(&self) -> Duration {
        Duration::from_secs(self.interval.saturating_add(1))
    }

    /// Number of polls that fit in the code's lifetime.
    pub fn max_attempts(&self) -> u64 {
        self.expires_in.div_ceil(self.interval.saturating_add(1))
    }
}

/// Result of a single token poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCodePoll {
    Pending,
    SlowDown,
    Authorized { credential: PrimaryCredential },
    AccessDenied,
    Expired,
}

/// Wire-level access to a device authorization server.
#[async_trait]
pub trait DeviceCodeBackend: Send + Sync {
    async fn request_device_code(&self) -> Result<DeviceCodeSession, AuthError>;

    /// One token poll. Unknown server error codes come back as
    /// [`AuthError::Protocol`].
    async fn poll_device_code(
        &self,
        session: &DeviceCodeSession,
    ) -> Result<DeviceCodePoll, AuthError>;
}

/// Runs the device-code protocol to completion.
#[derive(Clone)]
pub struct DeviceFlowAuthorizer {
    backend: Arc<dyn DeviceCodeBackend>,
}

impl DeviceFlowAuthorizer {
    pub fn new(backend: Arc<dyn DeviceCodeBackend>) -> Self {
        Self { backend }
    }

    pub async fn request_device_code(&self) -> Result<DeviceCodeSession, AuthError> {
        let session = self.backend.request_device_code().await?;
        tracing::debug!(
            verification_uri = %session.verification_uri,
            expires_in = session.expires_in,
            interval = session.interval,
            "device code issued"
        );
        Ok(session)
    }

    /// Poll until the user authorizes, the server rejects the attempt, the
    /// attempt budget runs out, or `cancel` fires.
    ///
    /// `slow_down` doubles the wait for the rest of the loop. Cancellation is
    /// checked before every request and interrupts the wait between polls.
    pub async fn poll_for_token(
        &self,
        session: &DeviceCodeSession,
        cancel: &CancellationToken,
    ) -> Result<PrimaryCredential, AuthError> {
        let max_attempts = session.max_attempts();
        let mut wait = session.initial_wait();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                tracing::debug!(attempt, "device flow cancelled");
                return Err(AuthError::Cancelled);
            }

            match self.backend.poll_device_code(session).await? {
                DeviceCodePoll::Authorized { credential } => {
                    tracing::info!(attempt, "device authorization granted");
                    return Ok(credential);
                }
                DeviceCodePoll::Pending => {
                    tracing::debug!(attempt, max_attempts, "authorization pending");
                }
                DeviceCodePoll::SlowDown => {
                    wait = wait.saturating_mul(2);
                    tracing::debug!(attempt, wait_secs = wait.as_secs(), "server asked to slow down");
                }
                DeviceCodePoll::Expired => return Err(AuthError::Expired),
                DeviceCodePoll::AccessDenied => return Err(AuthError::Denied),
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        Err(AuthError::Timeout)
    }
}

/// GitHub's device authorization endpoints.
///
/// # Example
/// ```no_run
/// use copilot_auth::auth::GitHubDeviceCodeBackend;
/// use copilot_auth::config::AuthConfig;
///
/// let backend = GitHubDeviceCodeBackend::from_config(&AuthConfig::default())?;
/// # Ok::<(), copilot_auth::auth::AuthError>(())
/// ```
pub struct GitHubDeviceCodeBackend {
    client: reqwest::Client,
    client_id: String,
    scope: String,
    device_code_url: String,
    access_token_url: String,
}

impl GitHubDeviceCodeBackend {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self::with_client(config.http_client()?, config))
    }

    pub fn with_client(client: reqwest::Client, config: &AuthConfig) -> Self {
        Self {
            client,
            client_id: config.client_id.clone(),
            scope: config.scope.clone(),
            device_code_url: config.device_code_url(),
            access_token_url: config.access_token_url(),
        }
    }
}

#[async_trait]
impl DeviceCodeBackend for GitHubDeviceCodeBackend {
    async fn request_device_code(&self) -> Result<DeviceCodeSession, AuthError> {
        let resp = self
            .client
            .post(&self.device_code_url)
            .header(ACCEPT, "application/json")
            .json(&DeviceCodeRequest {
                client_id: &self.client_id,
                scope: &self.scope,
            })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::server(status, "device code request failed"));
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|err| {
            AuthError::server(status, format!("device code response unparsable: {err}"))
        })
    }

    async fn poll_device_code(
        &self,
        session: &DeviceCodeSession,
    ) -> Result<DeviceCodePoll, AuthError> {
        let resp = self
            .client
            .post(&self.access_token_url)
            .header(ACCEPT, "application/json")
            .json(&DeviceTokenRequest {
                client_id: &self.client_id,
                device_code: &session.device_code,
                grant_type: DEVICE_CODE_GRANT_TYPE,
            })
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        let payload: DeviceTokenResponse = match serde_json::from_str(&body) {
            Ok(payload) => payload,
            Err(err) if status.is_success() => {
                // Malformed 2xx bodies count as pending.
                tracing::warn!(error = %err, "unparsable device token response, treating as pending");
                return Ok(DeviceCodePoll::Pending);
            }
            Err(err) => {
                return Err(AuthError::server(
                    status,
                    format!("device token response unparsable: {err}"),
                ));
            }
        };
        classify_token_response(status, payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
enum DeviceErrorCode {
    AuthorizationPending,
    SlowDown,
    ExpiredToken,
    AccessDenied,
}

fn classify_token_response(
    status: reqwest::StatusCode,
    payload: DeviceTokenResponse,
) -> Result<DeviceCodePoll, AuthError> {
    if let Some(credential) = payload.access_token.as_deref().and_then(PrimaryCredential::new) {
        return Ok(DeviceCodePoll::Authorized { credential });
    }
    let Some(code) = payload.error else {
        if !status.is_success() {
            return Err(AuthError::server(status, "device token request failed"));
        }
        return Err(AuthError::Protocol(
            "device token response missing access_token and error".to_string(),
        ));
    };
    match code.parse::<DeviceErrorCode>() {
        Ok(DeviceErrorCode::AuthorizationPending) => Ok(DeviceCodePoll::Pending),
        Ok(DeviceErrorCode::SlowDown) => Ok(DeviceCodePoll::SlowDown),
        Ok(DeviceErrorCode::ExpiredToken) => Ok(DeviceCodePoll::Expired),
        Ok(DeviceErrorCode::AccessDenied) => Ok(DeviceCodePoll::AccessDenied),
        Err(_) => Err(AuthError::Protocol(
            payload
                .error_description
                .unwrap_or_else(|| format!("device code error: {code}")),
        )),
    }
}

#[derive(Debug, Serialize)]
struct DeviceCodeRequest<'a> {
    client_id: &'a str,
    scope: &'a str,
}

#[derive(Debug, Serialize)]
struct DeviceTokenRequest<'a> {
    client_id: &'a str,
    device_code: &'a str,
    grant_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct DeviceTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}
