//! copilot-auth CLI binary entry point.

use clap::Parser;
use copilot_auth::cli::{Cli, Commands};
use copilot_auth::config::{default_config_path, AuthConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Login => copilot_auth::cli::auth::handle_login(&config).await,
        Commands::Status => copilot_auth::cli::auth::handle_status(&config).await,
        Commands::Token(args) => copilot_auth::cli::auth::handle_token(&config, args.raw).await,
        Commands::Logout => copilot_auth::cli::auth::handle_logout(&config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Defaults < config file < environment < command-line flags.
fn load_config(cli: &Cli) -> Result<AuthConfig, copilot_auth::auth::AuthError> {
    let _ = dotenvy::dotenv(); // load .env if present, ignore error
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = AuthConfig::from_toml_path(&path)?;
    config.apply_env();
    if let Some(token_path) = &cli.token_path {
        config.token_path = token_path.clone();
    }
    tracing::debug!(config = ?config, "configuration loaded");
    Ok(config)
}

/// Log to stderr, filtered by `RUST_LOG`.
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("copilot_auth=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
