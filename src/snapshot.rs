// src/snapshot.rs

//! Schema snapshots
//!
//! A snapshot is the full schema of one environment serialised as JSON. It
//! can be written for inspection or review and replayed later through
//! [`crate::client::InMemoryEnvironment::from_snapshot`], for example to plan
//! a migration from a reviewed source schema.

use crate::client::EnvironmentClient;
use crate::error::{Error, Result};
use crate::schema::{Field, Fieldset, ItemType, Plugin};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete schema of one environment at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub environment: String,
    pub captured_at: DateTime<Utc>,
    pub item_types: Vec<ItemType>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub fieldsets: Vec<Fieldset>,
    #[serde(default)]
    pub plugins: Vec<Plugin>,
}

impl SchemaSnapshot {
    /// Read a snapshot from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::ParseError(format!("Invalid snapshot {}: {}", path.display(), e))
        })
    }

    /// Write the snapshot as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Capture the complete schema of an environment
pub async fn capture_snapshot(client: &dyn EnvironmentClient) -> Result<SchemaSnapshot> {
    let item_types = client.list_item_types().await?;

    let mut fields = Vec::new();
    let mut fieldsets = Vec::new();
    for item_type in &item_types {
        fields.extend(client.list_fields(item_type.id.as_str()).await?);
        for mut fieldset in client.list_fieldsets(item_type.id.as_str()).await? {
            // Listing endpoints may omit the owner; it is implied by the call.
            fieldset.item_type.get_or_insert_with(|| item_type.id.clone());
            fieldsets.push(fieldset);
        }
    }
    let plugins = client.list_plugins().await?;

    info!(
        "Captured {} item types, {} fields, {} fieldsets, {} plugins from '{}'",
        item_types.len(),
        fields.len(),
        fieldsets.len(),
        plugins.len(),
        client.environment()
    );

    Ok(SchemaSnapshot {
        environment: client.environment().to_string(),
        captured_at: Utc::now(),
        item_types,
        fields,
        fieldsets,
        plugins,
    })
}
