//! copilot-auth: GitHub device-flow credentials for the Copilot API.
//!
//! Acquires a GitHub OAuth token through the device authorization grant,
//! persists it, verifies it against the identity endpoint, and keeps a
//! short-lived Copilot service token fresh in the background.
//!
//! # Quick Start
//!
//! ```no_run
//! use copilot_auth::prelude::*;
//!
//! # async fn example() -> Result<(), AuthError> {
//! let manager = AuthManager::new(&AuthConfig::from_env())?;
//! manager.initialize().await?;
//! let token = manager.get_token().await?;
//! println!("token valid until {}", token.expires_at);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
