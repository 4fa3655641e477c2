//! CLI handlers for login, status, token, and logout.

use std::sync::Arc;

use crate::auth::{
    AuthComponents, AuthError, AuthManager, CredentialStore, DeviceCodeSession,
    FileCredentialStore, GitHubIdentityVerifier, IdentityVerifier, PrimaryCredential,
};
use crate::config::AuthConfig;

/// Handle `copilot-auth login`.
pub async fn handle_login(config: &AuthConfig) -> Result<(), Box<dyn std::error::Error>> {
    let components = AuthComponents::from_config(config)?.with_presenter(Arc::new(
        |session: &DeviceCodeSession| {
            println!("🔗 Visit: {}", session.verification_uri);
            println!("📋 Enter code: {}", session.user_code);
            println!("⏳ Waiting for authorization...");
        },
    ));
    let manager = AuthManager::with_components(config, components);

    let outcome = run_until_interrupted(&manager, manager.initialize()).await;
    manager.destroy();
    match outcome {
        Ok(()) => {
            let login = manager
                .principal()
                .map(|principal| principal.login)
                .unwrap_or_else(|| "unknown".to_string());
            println!("✅ Logged in as {login}");
            Ok(())
        }
        Err(AuthError::Denied) => Err("❌ Authorization denied".into()),
        Err(AuthError::Expired | AuthError::Timeout) => {
            Err("❌ Device code expired, please try again".into())
        }
        Err(err) => Err(err.into()),
    }
}

/// Handle `copilot-auth status`.
pub async fn handle_status(config: &AuthConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileCredentialStore::new(config.token_path.clone());
    println!("🔐 Authentication Status\n");
    println!("  Token file: {}", store.path().display());

    let credential = if let Some(raw) = config.github_token.as_deref() {
        println!("  Source: GH_TOKEN");
        PrimaryCredential::new(raw)
    } else {
        store.load()
    };
    let Some(credential) = credential else {
        println!("  GitHub: ❌ Not logged in");
        return Ok(());
    };

    let verifier = GitHubIdentityVerifier::from_config(config)?;
    match verifier.verify(&credential).await {
        Ok(principal) => println!("  GitHub: ✅ Logged in as {}", principal.login),
        Err(AuthError::InvalidCredential(reason)) => {
            println!("  GitHub: ⚠️  Stored token rejected ({reason}); run `copilot-auth login`")
        }
        Err(err) => println!("  GitHub: ⚠️  Error: {err}"),
    }
    Ok(())
}

/// Handle `copilot-auth token`.
pub async fn handle_token(
    config: &AuthConfig,
    raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = AuthManager::new(config)?;
    let outcome = run_until_interrupted(&manager, manager.get_token()).await;
    manager.destroy();
    let token = outcome?;

    if raw {
        println!("{}", token.token);
    } else {
        println!(
            "✅ Copilot token valid until {}",
            token.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("   API: {}", token.api_base_url());
        println!("   Refresh suggested in {}s", token.refresh_in);
    }
    Ok(())
}

/// Handle `copilot-auth logout`.
pub async fn handle_logout(config: &AuthConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileCredentialStore::new(config.token_path.clone());
    store.clear()?;
    println!("✅ Logged out");
    Ok(())
}

/// Drive `work` to completion; Ctrl-C cancels the manager's device poll.
async fn run_until_interrupted<T>(
    manager: &AuthManager,
    work: impl std::future::Future<Output = Result<T, AuthError>>,
) -> Result<T, AuthError> {
    tokio::pin!(work);
    tokio::select! {
        outcome = &mut work => outcome,
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, cancelling authorization");
            manager.destroy();
            work.await
        }
    }
}
