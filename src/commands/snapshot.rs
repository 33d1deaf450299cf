// src/commands/snapshot.rs

//! Schema snapshot command

use super::connect;
use anyhow::{Context, Result};
use envsync::{SyncConfig, capture_snapshot};
use std::path::Path;

/// Capture `environment` (default: the source) to `output`
pub async fn cmd_snapshot(config: &SyncConfig, environment: Option<&str>, output: &Path) -> Result<()> {
    let environment = environment.unwrap_or(&config.source_environment);
    let token = config.resolve_token().context("Cannot authenticate")?;
    let client = connect(config, &token, environment)?;

    let snapshot = capture_snapshot(&client)
        .await
        .with_context(|| format!("Failed to capture environment '{}'", environment))?;
    snapshot
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Captured '{}': {} item types, {} fields, {} fieldsets, {} plugins -> {}",
        environment,
        snapshot.item_types.len(),
        snapshot.fields.len(),
        snapshot.fieldsets.len(),
        snapshot.plugins.len(),
        output.display()
    );
    Ok(())
}
