// src/commands/mod.rs
//! Command handlers for the envsync CLI

mod plan;
mod snapshot;
mod sync;

pub use plan::cmd_plan;
pub use snapshot::cmd_snapshot;
pub use sync::cmd_sync;

use anyhow::{Context, Result};
use envsync::{HttpEnvironment, SyncConfig};
use std::time::Duration;

/// Open an API client bound to `environment`
fn connect(config: &SyncConfig, token: &str, environment: &str) -> Result<HttpEnvironment> {
    HttpEnvironment::with_options(
        &config.api_url,
        token,
        environment,
        Duration::from_secs(config.request_timeout_secs),
        config.max_retries,
    )
    .with_context(|| format!("Failed to create client for environment '{}'", environment))
}
