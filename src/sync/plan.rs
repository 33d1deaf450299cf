// src/sync/plan.rs

//! Dry-run planning
//!
//! Computes the writes a [`super::Migration`] would issue without touching
//! the target. Entities owned by item types that do not exist in the target
//! yet are planned as plain creates. Field updates are compared after
//! remapping, so a plan of an already migrated target is empty.

use super::matcher::{NaturalKey, reconcile, split_unidentified};
use super::order::{Phase, order_blocks_first, order_fields_by_position, order_matches_by_position};
use super::remap::ReferenceRemapper;
use super::sanitize;
use crate::client::EnvironmentClient;
use crate::error::Result;
use crate::schema::{EntityKind, ItemType};
use std::collections::HashMap;
use std::fmt;

/// A single write the migration would perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Create {
        kind: EntityKind,
        key: String,
        owner: Option<String>,
    },
    Update {
        kind: EntityKind,
        key: String,
        owner: Option<String>,
    },
    Delete {
        kind: EntityKind,
        key: String,
        owner: Option<String>,
    },
}

impl SyncAction {
    /// One-line human readable form, e.g. `+ field post.title`
    pub fn description(&self) -> String {
        let (sign, kind, key, owner) = match self {
            SyncAction::Create { kind, key, owner } => ('+', kind, key, owner),
            SyncAction::Update { kind, key, owner } => ('~', kind, key, owner),
            SyncAction::Delete { kind, key, owner } => ('-', kind, key, owner),
        };
        match owner {
            Some(owner) => format!("{} {} {}.{}", sign, kind, owner, key),
            None => format!("{} {} {}", sign, kind, key),
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Writes grouped by phase, in execution order
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub phases: Vec<(Phase, Vec<SyncAction>)>,
    /// References that could not be resolved while planning
    pub warnings: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.phases.iter().all(|(_, actions)| actions.is_empty())
    }

    pub fn actions(&self, phase: Phase) -> &[SyncAction] {
        self.phases
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, actions)| actions.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.phases.iter().map(|(_, actions)| actions.len()).sum()
    }
}

fn create(kind: EntityKind, key: impl fmt::Display, owner: Option<&str>) -> SyncAction {
    SyncAction::Create {
        kind,
        key: key.to_string(),
        owner: owner.map(str::to_string),
    }
}

fn update(kind: EntityKind, key: impl fmt::Display, owner: Option<&str>) -> SyncAction {
    SyncAction::Update {
        kind,
        key: key.to_string(),
        owner: owner.map(str::to_string),
    }
}

fn delete(kind: EntityKind, key: impl fmt::Display, owner: Option<&str>) -> SyncAction {
    SyncAction::Delete {
        kind,
        key: key.to_string(),
        owner: owner.map(str::to_string),
    }
}

/// Compute what migrating `source` into `target` would write
pub async fn compute_plan(
    source: &dyn EnvironmentClient,
    target: &dyn EnvironmentClient,
) -> Result<SyncPlan> {
    let mut plan = SyncPlan::default();

    // Plugins
    let (source_plugins, skipped_source) = split_unidentified(source.list_plugins().await?);
    let (target_plugins, skipped_target) = split_unidentified(target.list_plugins().await?);
    for plugin in skipped_source.iter().chain(&skipped_target) {
        plan.warnings
            .push(format!("Skipping plugin {}: no package name or url", plugin.id));
    }
    let diff = reconcile(&source_plugins, &target_plugins);
    let mut actions = Vec::new();
    for plugin in diff.to_create {
        actions.push(create(EntityKind::Plugin, plugin.natural_key(), None));
    }
    for plugin in diff.to_delete {
        actions.push(delete(EntityKind::Plugin, plugin.natural_key(), None));
    }
    plan.phases.push((Phase::Plugins, actions));

    // Blocks and models
    let mut source_types = source.list_item_types().await?;
    order_blocks_first(&mut source_types);
    let target_types = target.list_item_types().await?;
    let diff = reconcile(&source_types, &target_types);
    let mut actions = Vec::new();
    for item_type in diff.to_create {
        actions.push(create(EntityKind::ItemType, &item_type.api_key, None));
    }
    for matched in diff.to_update {
        let payload = sanitize::item_type_payload(matched.source)?;
        if sanitize::differs(&payload, &sanitize::item_type_payload(matched.target)?) {
            actions.push(update(EntityKind::ItemType, &matched.source.api_key, None));
        }
    }
    for item_type in diff.to_delete {
        actions.push(delete(EntityKind::ItemType, &item_type.api_key, None));
    }
    plan.phases.push((Phase::ItemTypes, actions));

    let owners: HashMap<&str, &ItemType> = target_types
        .iter()
        .map(|t| (t.api_key.as_str(), t))
        .collect();

    // Fieldsets
    let mut actions = Vec::new();
    for source_type in &source_types {
        let owner_key = Some(source_type.api_key.as_str());
        let source_fieldsets = source.list_fieldsets(source_type.id.as_str()).await?;
        let target_fieldsets = match owners.get(source_type.api_key.as_str()) {
            Some(owner) => target.list_fieldsets(owner.id.as_str()).await?,
            None => Vec::new(),
        };

        let diff = reconcile(&source_fieldsets, &target_fieldsets);
        for fieldset in diff.to_create {
            actions.push(create(EntityKind::Fieldset, &fieldset.title, owner_key));
        }
        for matched in diff.to_update {
            let payload = sanitize::fieldset_payload(matched.source)?;
            if sanitize::differs(&payload, &sanitize::fieldset_payload(matched.target)?) {
                actions.push(update(EntityKind::Fieldset, &matched.source.title, owner_key));
            }
        }
        for fieldset in diff.to_delete {
            actions.push(delete(EntityKind::Fieldset, &fieldset.title, owner_key));
        }
    }
    plan.phases.push((Phase::Fieldsets, actions));

    // Fields
    let mut remapper = ReferenceRemapper::new(source, target, &source_types, &target_types);
    remapper.index_target_plugins(&target_plugins);
    let mut actions = Vec::new();
    for source_type in &source_types {
        let owner_key = source_type.api_key.as_str();
        let mut source_fields = source.list_fields(source_type.id.as_str()).await?;
        source_fields.sort_by_key(|f| f.position);

        let Some(owner) = owners.get(owner_key) else {
            for field in &source_fields {
                actions.push(create(EntityKind::Field, &field.api_key, Some(owner_key)));
            }
            continue;
        };

        remapper.index_target_fieldsets(owner_key, &target.list_fieldsets(owner.id.as_str()).await?);
        let target_fields = target.list_fields(owner.id.as_str()).await?;
        let diff = reconcile(&source_fields, &target_fields);

        let mut to_create = diff.to_create;
        order_fields_by_position(&mut to_create);
        for field in to_create {
            actions.push(create(EntityKind::Field, &field.api_key, Some(owner_key)));
        }

        let mut to_update = diff.to_update;
        order_matches_by_position(&mut to_update);
        for matched in to_update {
            let mut payload = sanitize::field_payload(matched.source)?;
            let changed = match remapper.remap_field(&mut payload, owner_key).await {
                Ok(()) => sanitize::differs(&payload, &sanitize::field_payload(matched.target)?),
                Err(e) => {
                    plan.warnings.push(e.to_string());
                    true
                }
            };
            if changed {
                actions.push(update(EntityKind::Field, &matched.source.api_key, Some(owner_key)));
            }
        }

        for field in diff.to_delete {
            actions.push(delete(EntityKind::Field, &field.api_key, Some(owner_key)));
        }
    }
    plan.warnings.extend(remapper.take_warnings());
    plan.phases.push((Phase::Fields, actions));

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryEnvironment;
    use crate::schema::Payload;
    use serde_json::{Value, json};

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_action_description() {
        let action = create(EntityKind::Field, "title", Some("post"));
        assert_eq!(action.description(), "+ field post.title");
        let action = delete(EntityKind::ItemType, "legacy", None);
        assert_eq!(action.to_string(), "- item type legacy");
    }

    #[tokio::test]
    async fn test_plan_does_not_write() {
        let source = InMemoryEnvironment::new("development", 1);
        let target = InMemoryEnvironment::new("production", 1000);
        source
            .create_item_type(payload(json!({"api_key": "post"})))
            .await
            .unwrap();
        source
            .create_field("post", payload(json!({"api_key": "title", "position": 1})))
            .await
            .unwrap();
        target
            .create_item_type(payload(json!({"api_key": "legacy"})))
            .await
            .unwrap();
        target.clear_operations();

        let plan = compute_plan(&source, &target).await.unwrap();
        assert!(target.operations().is_empty());

        assert_eq!(
            plan.actions(Phase::ItemTypes),
            &[
                create(EntityKind::ItemType, "post", None),
                delete(EntityKind::ItemType, "legacy", None),
            ]
        );
        assert_eq!(
            plan.actions(Phase::Fields),
            &[create(EntityKind::Field, "title", Some("post"))]
        );
        assert_eq!(plan.len(), 3);
    }

    #[tokio::test]
    async fn test_identical_environments_plan_nothing() {
        let source = InMemoryEnvironment::new("development", 1);
        let target = InMemoryEnvironment::new("production", 1000);
        for env in [&source, &target] {
            env.create_item_type(payload(json!({"api_key": "post", "name": "Post"})))
                .await
                .unwrap();
            env.create_field("post", payload(json!({"api_key": "title", "position": 1})))
                .await
                .unwrap();
        }

        let plan = compute_plan(&source, &target).await.unwrap();
        assert!(plan.is_empty(), "unexpected actions: {:?}", plan.phases);
    }
}
