// src/commands/plan.rs

//! Dry-run command

use super::connect;
use anyhow::{Context, Result};
use envsync::{EnvironmentClient, InMemoryEnvironment, SchemaSnapshot, SyncConfig, compute_plan};
use std::path::Path;
use tracing::info;

/// Print the changes a sync would make, grouped by phase
pub async fn cmd_plan(config: &SyncConfig, source_snapshot: Option<&Path>) -> Result<()> {
    let token = config.resolve_token().context("Cannot authenticate")?;
    let target = connect(config, &token, &config.target_environment)?;

    let plan = match source_snapshot {
        Some(path) => {
            let snapshot = SchemaSnapshot::load(path)
                .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
            info!(
                "Planning from snapshot of '{}' taken {}",
                snapshot.environment, snapshot.captured_at
            );
            let source = InMemoryEnvironment::from_snapshot(&snapshot);
            compute_plan(&source, &target).await?
        }
        None => {
            let source = connect(config, &token, &config.source_environment)?;
            compute_plan(&source, &target).await?
        }
    };

    if plan.is_empty() {
        println!(
            "'{}' is in sync with the source - no changes needed",
            target.environment()
        );
    } else {
        println!("Changes needed in '{}':", target.environment());
        println!();
        for (phase, actions) in &plan.phases {
            if actions.is_empty() {
                continue;
            }
            println!("{} ({}):", phase, actions.len());
            for action in actions {
                println!("  {}", action.description());
            }
            println!();
        }
    }

    if !plan.warnings.is_empty() {
        println!("Warnings:");
        for warning in &plan.warnings {
            println!("  {}", warning);
        }
    }

    Ok(())
}
