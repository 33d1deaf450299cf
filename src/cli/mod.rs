// src/cli/mod.rs
//! CLI definitions for envsync
//!
//! This module contains the command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `sync` - Migrate the source schema into the target environment
//! - `plan` - Show what `sync` would change, without writing
//! - `snapshot` - Capture an environment's schema as JSON

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use envsync::SyncConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "envsync")]
#[command(version)]
#[command(about = "One-way schema migration between CMS environments", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command; they override the configuration file
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file (default: ./envsync.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Source environment
    #[arg(long, global = true)]
    pub source: Option<String>,

    /// Target environment
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// Dotenv file holding the API token
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,
}

impl GlobalArgs {
    /// Load the configuration and apply flag overrides
    pub fn load_config(&self) -> Result<SyncConfig> {
        let mut config =
            SyncConfig::load(self.config.as_deref()).context("Failed to load configuration")?;

        if let Some(source) = &self.source {
            config.source_environment = source.clone();
        }
        if let Some(target) = &self.target {
            config.target_environment = target.clone();
        }
        if let Some(env_file) = &self.env_file {
            config.env_file = env_file.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate the source schema into the target environment
    Sync,

    /// Show the changes `sync` would make
    Plan {
        /// Plan from a saved snapshot instead of the live source
        #[arg(long)]
        source_snapshot: Option<PathBuf>,
    },

    /// Capture an environment's schema to a JSON file
    Snapshot {
        /// Environment to capture (default: the source environment)
        #[arg(long)]
        env: Option<String>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}
