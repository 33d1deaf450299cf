// src/commands/sync.rs

//! Schema migration command

use super::connect;
use anyhow::{Context, Result, anyhow};
use envsync::{Migration, MigrationReport, SyncConfig};
use tracing::info;

/// Migrate the source environment's schema into the target environment
///
/// Fails (non-zero exit) when any phase was stopped by an error.
pub async fn cmd_sync(config: &SyncConfig) -> Result<()> {
    if config.source_environment == config.target_environment {
        return Err(anyhow!(
            "Source and target are both '{}'",
            config.source_environment
        ));
    }

    let token = config.resolve_token().context("Cannot authenticate")?;
    let source = connect(config, &token, &config.source_environment)?;
    let target = connect(config, &token, &config.target_environment)?;

    info!(
        "Syncing schema: {} -> {}",
        config.source_environment, config.target_environment
    );
    let report = Migration::new(&source, &target).run().await;
    print_report(&report);

    if report.is_clean() {
        Ok(())
    } else {
        Err(anyhow!("Migration finished with errors"))
    }
}

fn print_report(report: &MigrationReport) {
    println!(
        "Migration {} -> {}",
        report.source_environment, report.target_environment
    );
    println!();

    for phase in &report.phases {
        let status = if phase.error.is_some() { "FAILED" } else { "ok" };
        println!(
            "  {:<18} {:>4} created {:>4} updated {:>4} unchanged {:>4} deleted  [{}]",
            phase.phase.as_str(),
            phase.created,
            phase.updated,
            phase.unchanged,
            phase.deleted,
            status
        );
        for warning in &phase.warnings {
            println!("      warning: {}", warning);
        }
        if let Some(error) = &phase.error {
            println!("      error: {}", error);
        }
    }

    println!();
    if report.total_writes() == 0 && report.is_clean() {
        println!("Target is in sync with source - no changes made");
    } else {
        println!("{} change(s) applied", report.total_writes());
    }
}
