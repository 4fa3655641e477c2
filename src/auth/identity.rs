use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use super::token::PrimaryCredential;
use crate::config::AuthConfig;

/// Authenticated GitHub account behind a primary credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub login: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Confirms a primary credential is accepted by the identity endpoint.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Fails with [`AuthError::InvalidCredential`] on any non-2xx response.
    async fn verify(&self, credential: &PrimaryCredential) -> Result<Principal, AuthError>;
}

/// `GET /user` on the GitHub REST API.
pub struct GitHubIdentityVerifier {
    client: reqwest::Client,
    user_url: String,
}

impl GitHubIdentityVerifier {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self::with_client(config.http_client()?, config))
    }

    pub fn with_client(client: reqwest::Client, config: &AuthConfig) -> Self {
        Self {
            client,
            user_url: config.user_url(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for GitHubIdentityVerifier {
    async fn verify(&self, credential: &PrimaryCredential) -> Result<Principal, AuthError> {
        let resp = self
            .client
            .get(&self.user_url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, credential.authorization_header())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::InvalidCredential(format!(
                "identity check failed with status {status}"
            )));
        }
        let principal: Principal = resp.json().await.map_err(|err| {
            AuthError::Protocol(format!("identity response missing login: {err}"))
        })?;
        tracing::debug!(login = %principal.login, "credential verified");
        Ok(principal)
    }
}
