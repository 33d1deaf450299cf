// src/sync/orchestrator.rs

//! Migration orchestrator
//!
//! Drives the four phases against a source and a target environment. Each
//! phase reads both sides fresh, matches by natural key, then writes creates,
//! updates and deletes one call at a time. A failing call stops the rest of
//! its phase; the following phases still run.

use super::matcher::{reconcile, split_unidentified};
use super::order::{Phase, order_blocks_first, order_fields_by_position, order_matches_by_position};
use super::remap::ReferenceRemapper;
use super::sanitize;
use crate::client::EnvironmentClient;
use crate::error::Result;
use crate::schema::{Field, ItemType, Payload};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Outcome of one phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub created: usize,
    pub updated: usize,
    /// Matched entities whose target already had the source's shape
    pub unchanged: usize,
    pub deleted: usize,
    pub warnings: Vec<String>,
    /// Error that stopped the phase, if any
    pub error: Option<String>,
}

impl PhaseReport {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            created: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            warnings: Vec::new(),
            error: None,
        }
    }

    /// Number of writes issued against the target
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Outcome of a whole migration run
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub source_environment: String,
    pub target_environment: String,
    /// One entry per phase, in execution order
    pub phases: Vec<PhaseReport>,
}

impl MigrationReport {
    /// Whether every phase ran to completion
    pub fn is_clean(&self) -> bool {
        self.phases.iter().all(|p| p.error.is_none())
    }

    pub fn total_writes(&self) -> usize {
        self.phases.iter().map(PhaseReport::writes).sum()
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

/// One-way schema migration from `source` into `target`
pub struct Migration<'a> {
    source: &'a dyn EnvironmentClient,
    target: &'a dyn EnvironmentClient,
}

impl<'a> Migration<'a> {
    pub fn new(source: &'a dyn EnvironmentClient, target: &'a dyn EnvironmentClient) -> Self {
        Self { source, target }
    }

    /// Run every phase in order and report what happened
    ///
    /// Never fails as a whole: phase errors are caught, logged and recorded
    /// in the returned report.
    pub async fn run(&self) -> MigrationReport {
        info!(
            "Migrating schema from '{}' to '{}'",
            self.source.environment(),
            self.target.environment()
        );

        let mut phases = Vec::with_capacity(Phase::SEQUENCE.len());
        for phase in Phase::SEQUENCE {
            info!("Phase: {}", phase);
            let mut report = PhaseReport::new(phase);

            let result = match phase {
                Phase::Plugins => self.migrate_plugins(&mut report).await,
                Phase::ItemTypes => self.migrate_item_types(&mut report).await,
                Phase::Fieldsets => self.migrate_fieldsets(&mut report).await,
                Phase::Fields => self.migrate_fields(&mut report).await,
            };

            if let Err(e) = result {
                warn!("Phase '{}' stopped: {}", phase, e);
                report.error = Some(e.to_string());
            }

            info!(
                "Phase '{}' done: {} created, {} updated, {} unchanged, {} deleted",
                phase, report.created, report.updated, report.unchanged, report.deleted
            );
            phases.push(report);
        }

        MigrationReport {
            source_environment: self.source.environment().to_string(),
            target_environment: self.target.environment().to_string(),
            phases,
        }
    }

    /// Plugins are installed or removed, never reconfigured
    async fn migrate_plugins(&self, report: &mut PhaseReport) -> Result<()> {
        let (source, skipped_source) = split_unidentified(self.source.list_plugins().await?);
        let (target, skipped_target) = split_unidentified(self.target.list_plugins().await?);
        for (plugin, environment) in skipped_source
            .iter()
            .map(|p| (p, self.source.environment()))
            .chain(skipped_target.iter().map(|p| (p, self.target.environment())))
        {
            report.warn(format!(
                "Skipping plugin {} in '{}': no package name or url",
                plugin.id, environment
            ));
        }
        let diff = reconcile(&source, &target);

        for plugin in diff.to_create {
            self.target
                .create_plugin(sanitize::plugin_payload(plugin)?)
                .await?;
            info!("Installed plugin {}", plugin.display_name());
            report.created += 1;
        }

        report.unchanged += diff.to_update.len();

        for plugin in diff.to_delete {
            self.target.delete_plugin(&plugin.id).await?;
            info!("Removed plugin {}", plugin.display_name());
            report.deleted += 1;
        }

        Ok(())
    }

    async fn migrate_item_types(&self, report: &mut PhaseReport) -> Result<()> {
        let mut source = self.source.list_item_types().await?;
        order_blocks_first(&mut source);
        let target = self.target.list_item_types().await?;
        let diff = reconcile(&source, &target);

        for item_type in diff.to_create {
            self.target
                .create_item_type(sanitize::item_type_payload(item_type)?)
                .await?;
            info!("Created {} {}", item_type.kind_label(), item_type.api_key);
            report.created += 1;
        }

        for matched in diff.to_update {
            let payload = sanitize::item_type_payload(matched.source)?;
            if !sanitize::differs(&payload, &sanitize::item_type_payload(matched.target)?) {
                debug!("{} {} is up to date", matched.source.kind_label(), matched.source.api_key);
                report.unchanged += 1;
                continue;
            }
            self.target
                .update_item_type(matched.target_id(), payload)
                .await?;
            info!("Updated {} {}", matched.source.kind_label(), matched.source.api_key);
            report.updated += 1;
        }

        for item_type in diff.to_delete {
            self.target.delete_item_type(&item_type.id).await?;
            info!("Deleted {} {}", item_type.kind_label(), item_type.api_key);
            report.deleted += 1;
        }

        Ok(())
    }

    async fn migrate_fieldsets(&self, report: &mut PhaseReport) -> Result<()> {
        let source_types = self.source.list_item_types().await?;
        let target_types = self.target.list_item_types().await?;
        let owners = target_owners(&target_types);

        for source_type in &source_types {
            let Some(owner) = owners.get(source_type.api_key.as_str()) else {
                report.warn(format!(
                    "Skipping fieldsets of {}: not present in '{}'",
                    source_type.api_key,
                    self.target.environment()
                ));
                continue;
            };

            let source = self.source.list_fieldsets(source_type.id.as_str()).await?;
            let target = self.target.list_fieldsets(owner.id.as_str()).await?;
            let diff = reconcile(&source, &target);

            for fieldset in diff.to_create {
                self.target
                    .create_fieldset(owner.id.as_str(), sanitize::fieldset_payload(fieldset)?)
                    .await?;
                info!("Created fieldset '{}' in {}", fieldset.title, owner.api_key);
                report.created += 1;
            }

            for matched in diff.to_update {
                let payload = sanitize::fieldset_payload(matched.source)?;
                if !sanitize::differs(&payload, &sanitize::fieldset_payload(matched.target)?) {
                    report.unchanged += 1;
                    continue;
                }
                self.target
                    .update_fieldset(matched.target_id(), payload)
                    .await?;
                info!("Updated fieldset '{}' in {}", matched.source.title, owner.api_key);
                report.updated += 1;
            }

            for fieldset in diff.to_delete {
                self.target.delete_fieldset(&fieldset.id).await?;
                info!("Deleted fieldset '{}' from {}", fieldset.title, owner.api_key);
                report.deleted += 1;
            }
        }

        Ok(())
    }

    async fn migrate_fields(&self, report: &mut PhaseReport) -> Result<()> {
        let mut source_types = self.source.list_item_types().await?;
        order_blocks_first(&mut source_types);
        let target_types = self.target.list_item_types().await?;
        let owners = target_owners(&target_types);

        let mut remapper =
            ReferenceRemapper::new(self.source, self.target, &source_types, &target_types);
        remapper.index_target_plugins(&self.target.list_plugins().await?);

        for source_type in &source_types {
            let Some(owner) = owners.get(source_type.api_key.as_str()) else {
                report.warn(format!(
                    "Skipping fields of {}: not present in '{}'",
                    source_type.api_key,
                    self.target.environment()
                ));
                continue;
            };
            let owner_key = owner.api_key.as_str();

            remapper.index_target_fieldsets(
                owner_key,
                &self.target.list_fieldsets(owner.id.as_str()).await?,
            );

            let source = self.source.list_fields(source_type.id.as_str()).await?;
            let target = self.target.list_fields(owner.id.as_str()).await?;
            let diff = reconcile(&source, &target);

            let mut to_create = diff.to_create;
            order_fields_by_position(&mut to_create);
            for field in to_create {
                let payload = field_payload(&mut remapper, field, owner_key, report).await?;
                self.target.create_field(owner.id.as_str(), payload).await?;
                info!("Created field {}.{}", owner_key, field.api_key);
                report.created += 1;
            }

            let mut to_update = diff.to_update;
            order_matches_by_position(&mut to_update);
            for matched in to_update {
                let payload =
                    field_payload(&mut remapper, matched.source, owner_key, report).await?;
                if !sanitize::differs(&payload, &sanitize::field_payload(matched.target)?) {
                    report.unchanged += 1;
                    continue;
                }
                self.target
                    .update_field(matched.target_id(), payload)
                    .await?;
                info!("Updated field {}.{}", owner_key, matched.source.api_key);
                report.updated += 1;
            }

            for field in diff.to_delete {
                self.target.delete_field(&field.id).await?;
                info!("Deleted field {}.{}", owner_key, field.api_key);
                report.deleted += 1;
            }
        }

        Ok(())
    }
}

/// Target item types by api_key
fn target_owners(item_types: &[ItemType]) -> HashMap<&str, &ItemType> {
    item_types
        .iter()
        .map(|t| (t.api_key.as_str(), t))
        .collect()
}

/// Sanitized, remapped payload of a source field
///
/// Best-effort warnings land in the report even when a fatal reference
/// aborts the field.
async fn field_payload(
    remapper: &mut ReferenceRemapper<'_>,
    field: &Field,
    owner: &str,
    report: &mut PhaseReport,
) -> Result<Payload> {
    let mut payload = sanitize::field_payload(field)?;
    let remapped = remapper.remap_field(&mut payload, owner).await;
    report.warnings.extend(remapper.take_warnings());
    remapped?;
    Ok(payload)
}
