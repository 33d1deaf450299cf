// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.global.load_config()?;

    match cli.command {
        Commands::Sync => commands::cmd_sync(&config).await,
        Commands::Plan { source_snapshot } => {
            commands::cmd_plan(&config, source_snapshot.as_deref()).await
        }
        Commands::Snapshot { env, output } => {
            commands::cmd_snapshot(&config, env.as_deref(), &output).await
        }
    }
}
