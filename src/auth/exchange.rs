use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use super::error::AuthError;
use super::token::{parse_expires_at, PrimaryCredential, ServiceToken};
use crate::config::AuthConfig;

/// Mints service tokens from a primary credential.
///
/// Implementations must not hold manager state; callers apply the result.
#[async_trait]
pub trait ServiceTokenExchanger: Send + Sync {
    async fn exchange(&self, credential: &PrimaryCredential) -> Result<ServiceToken, AuthError>;
}

/// `GET /copilot_internal/v2/token` on the GitHub API.
///
/// # Example
/// ```no_run
/// use copilot_auth::auth::{CopilotTokenExchanger, PrimaryCredential, ServiceTokenExchanger};
/// use copilot_auth::config::AuthConfig;
///
/// # async fn example() -> Result<(), copilot_auth::auth::AuthError> {
/// let exchanger = CopilotTokenExchanger::from_config(&AuthConfig::default())?;
/// let credential = PrimaryCredential::new("ghu_example").unwrap();
/// let token = exchanger.exchange(&credential).await?;
/// println!("valid until {}", token.expires_at);
/// # Ok(())
/// # }
/// ```
pub struct CopilotTokenExchanger {
    client: reqwest::Client,
    token_url: String,
}

impl CopilotTokenExchanger {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self::with_client(config.http_client()?, config))
    }

    pub fn with_client(client: reqwest::Client, config: &AuthConfig) -> Self {
        Self {
            client,
            token_url: config.copilot_token_url(),
        }
    }
}

#[async_trait]
impl ServiceTokenExchanger for CopilotTokenExchanger {
    async fn exchange(&self, credential: &PrimaryCredential) -> Result<ServiceToken, AuthError> {
        let resp = self
            .client
            .get(&self.token_url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, credential.authorization_header())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::Exchange(format!(
                "token exchange failed with status {status}"
            )));
        }
        let payload: TokenExchangeResponse = resp
            .json()
            .await
            .map_err(|err| AuthError::Exchange(format!("token exchange response unparsable: {err}")))?;
        let token = into_service_token(payload)?;
        tracing::debug!(
            expires_at = %token.expires_at,
            refresh_in = token.refresh_in,
            "service token issued"
        );
        Ok(token)
    }
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    token: Option<String>,
    expires_at: Option<serde_json::Value>,
    refresh_in: Option<u64>,
}

fn into_service_token(payload: TokenExchangeResponse) -> Result<ServiceToken, AuthError> {
    let token = payload
        .token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| AuthError::Exchange("token missing".to_string()))?;
    let expires_at = payload
        .expires_at
        .ok_or_else(|| AuthError::Exchange("expires_at missing".to_string()))
        .and_then(|value| parse_expires_at(&value))?;
    let refresh_in = payload
        .refresh_in
        .ok_or_else(|| AuthError::Exchange("refresh_in missing".to_string()))?;
    Ok(ServiceToken {
        token,
        expires_at,
        refresh_in,
    })
}
