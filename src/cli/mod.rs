//! CLI entry point for copilot-auth.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// GitHub Copilot device-flow credentials
#[derive(Parser, Debug)]
#[command(name = "copilot-auth", version, about = "GitHub Copilot credential manager")]
pub struct Cli {
    /// TOML config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override where the GitHub token is stored
    #[arg(long, global = true)]
    pub token_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authorize this device (reuses a stored token when still valid)
    Login,
    /// Show whether a stored token exists and is accepted
    Status,
    /// Print a currently valid Copilot token
    Token(TokenArgs),
    /// Forget the stored GitHub token
    Logout,
}

/// Arguments for `copilot-auth token`.
#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// Print only the raw token
    #[arg(long)]
    pub raw: bool,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
