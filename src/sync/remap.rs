// src/sync/remap.rs

//! Cross-environment reference remapping
//!
//! A field payload read from the source embeds source ids: its fieldset,
//! the plugins behind its editor addons, the item types its validators link
//! to, and the title field a slug validator follows. Every one of them is
//! rewritten through a single resolver:
//!
//! ```text
//! source id --(source index | live source lookup)--> natural key
//! natural key --(target index | live target lookup)--> target id
//! ```
//!
//! What happens when resolution fails depends on the kind of reference,
//! see [`ReferenceKind::policy`].

use crate::client::EnvironmentClient;
use crate::error::{Error, Result};
use crate::schema::{EntityId, Fieldset, ItemType, Payload, Plugin};
use crate::sync::matcher::{NaturalKey, PluginKey};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Kinds of cross-entity references found in field payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// `fieldset` of the field
    Fieldset,
    /// `appearance.addons[].id`
    PluginAddon,
    /// `validators.*.item_types[]`
    ItemType,
    /// `validators.*.title_field_id`
    TitleField,
}

/// What to do when a reference cannot be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Abort the field being migrated
    Fatal,
    /// Warn and write the field anyway
    BestEffort,
}

impl ReferenceKind {
    /// Validator references have no valid substitute; presentation ones do.
    pub fn policy(&self) -> ResolutionPolicy {
        match self {
            ReferenceKind::ItemType | ReferenceKind::TitleField => ResolutionPolicy::Fatal,
            ReferenceKind::Fieldset | ReferenceKind::PluginAddon => ResolutionPolicy::BestEffort,
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Fieldset => write!(f, "fieldset"),
            ReferenceKind::PluginAddon => write!(f, "plugin addon"),
            ReferenceKind::ItemType => write!(f, "validator item type"),
            ReferenceKind::TitleField => write!(f, "validator title field"),
        }
    }
}

/// Natural key a source reference resolves to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ReferenceKey {
    ItemType(String),
    Fieldset { owner: String, title: String },
    Plugin(PluginKey),
    Field { owner: String, api_key: String },
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKey::ItemType(api_key) => write!(f, "{}", api_key),
            ReferenceKey::Fieldset { owner, title } => write!(f, "{} / '{}'", owner, title),
            ReferenceKey::Plugin(key) => write!(f, "{}", key),
            ReferenceKey::Field { owner, api_key } => write!(f, "{}.{}", owner, api_key),
        }
    }
}

/// Rewrites source ids embedded in field payloads to target ids
///
/// Holds the natural-key indexes of both environments. Misses fall back to
/// live lookups whose successful results are cached for the rest of the run.
pub struct ReferenceRemapper<'a> {
    source: &'a dyn EnvironmentClient,
    target: &'a dyn EnvironmentClient,
    /// Source item type id -> api_key
    source_item_types: HashMap<EntityId, String>,
    /// Source id -> natural key, per reference kind
    source_keys: HashMap<(ReferenceKind, EntityId), ReferenceKey>,
    /// Natural key -> target id
    target_ids: HashMap<ReferenceKey, EntityId>,
    warnings: Vec<String>,
}

impl<'a> ReferenceRemapper<'a> {
    /// Create a remapper indexing both environments' item types
    pub fn new(
        source: &'a dyn EnvironmentClient,
        target: &'a dyn EnvironmentClient,
        source_item_types: &[ItemType],
        target_item_types: &[ItemType],
    ) -> Self {
        let mut remapper = Self {
            source,
            target,
            source_item_types: HashMap::new(),
            source_keys: HashMap::new(),
            target_ids: HashMap::new(),
            warnings: Vec::new(),
        };
        for item_type in source_item_types {
            remapper
                .source_item_types
                .insert(item_type.id.clone(), item_type.api_key.clone());
        }
        remapper.index_target_item_types(target_item_types);
        remapper
    }

    pub fn index_target_item_types(&mut self, item_types: &[ItemType]) {
        for item_type in item_types {
            self.target_ids.insert(
                ReferenceKey::ItemType(item_type.api_key.clone()),
                item_type.id.clone(),
            );
        }
    }

    /// Index the target fieldsets owned by the item type `owner` (an api_key)
    pub fn index_target_fieldsets(&mut self, owner: &str, fieldsets: &[Fieldset]) {
        for fieldset in fieldsets {
            self.target_ids.insert(
                ReferenceKey::Fieldset {
                    owner: owner.to_string(),
                    title: fieldset.title.clone(),
                },
                fieldset.id.clone(),
            );
        }
    }

    pub fn index_target_plugins(&mut self, plugins: &[Plugin]) {
        for plugin in plugins {
            self.target_ids
                .insert(ReferenceKey::Plugin(plugin.natural_key()), plugin.id.clone());
        }
    }

    /// Warnings raised by best-effort references since the last call
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Resolve a source id to the target id of the same logical entity
    ///
    /// `owner` is the api_key of the item type owning the field whose payload
    /// carries the reference.
    pub async fn resolve(
        &mut self,
        kind: ReferenceKind,
        source_id: &EntityId,
        owner: &str,
    ) -> Result<EntityId> {
        let key = self.source_key(kind, source_id, owner).await?;
        let target_id = self.target_id(&key).await.map_err(|e| Error::Resolution {
            kind,
            reference: format!("{} ({})", source_id, key),
            reason: e.to_string(),
        })?;
        debug!("{} {} -> {} -> {}", kind, source_id, key, target_id);
        Ok(target_id)
    }

    /// Resolve a reference, applying the policy of its kind
    ///
    /// Returns `Ok(None)` when a best-effort reference could not be resolved.
    pub async fn remap(
        &mut self,
        kind: ReferenceKind,
        source_id: &EntityId,
        owner: &str,
    ) -> Result<Option<EntityId>> {
        match self.resolve(kind, source_id, owner).await {
            Ok(target_id) => Ok(Some(target_id)),
            Err(err) => match kind.policy() {
                ResolutionPolicy::Fatal => Err(err),
                ResolutionPolicy::BestEffort => {
                    warn!("{}", err);
                    self.warnings.push(err.to_string());
                    Ok(None)
                }
            },
        }
    }

    /// Rewrite every reference in a sanitized field payload, in place
    ///
    /// An unresolved fieldset detaches the field (`fieldset: null`) rather
    /// than sending an id that means nothing in the target. An unresolved
    /// addon keeps its id.
    pub async fn remap_field(&mut self, payload: &mut Payload, owner: &str) -> Result<()> {
        if let Some(source_id) = payload.get("fieldset").and_then(Value::as_str) {
            let source_id = EntityId::from(source_id);
            let remapped = self.remap(ReferenceKind::Fieldset, &source_id, owner).await?;
            payload.insert(
                "fieldset".to_string(),
                remapped.map_or(Value::Null, |id| Value::from(id.as_str())),
            );
        }

        if let Some(addons) = payload
            .get_mut("appearance")
            .and_then(|appearance| appearance.get_mut("addons"))
            .and_then(Value::as_array_mut)
        {
            for addon in addons.iter_mut() {
                let Some(source_id) = addon.get("id").and_then(Value::as_str).map(EntityId::from)
                else {
                    continue;
                };
                if let Some(target_id) = self.remap(ReferenceKind::PluginAddon, &source_id, owner).await?
                    && let Some(addon) = addon.as_object_mut()
                {
                    addon.insert("id".to_string(), Value::from(target_id.as_str()));
                }
            }
        }

        if let Some(validators) = payload.get_mut("validators").and_then(Value::as_object_mut) {
            for config in validators.values_mut() {
                let Some(config) = config.as_object_mut() else {
                    continue;
                };

                if let Some(item_types) = config.get_mut("item_types").and_then(Value::as_array_mut) {
                    for entry in item_types.iter_mut() {
                        let Some(source_id) = entry.as_str().map(EntityId::from) else {
                            return Err(Error::Resolution {
                                kind: ReferenceKind::ItemType,
                                reference: entry.to_string(),
                                reason: "expected an item type id string".to_string(),
                            });
                        };
                        if let Some(target_id) = self.remap(ReferenceKind::ItemType, &source_id, owner).await? {
                            *entry = Value::from(target_id.as_str());
                        }
                    }
                }

                if let Some(source_id) = config
                    .get("title_field_id")
                    .and_then(Value::as_str)
                    .map(EntityId::from)
                    && let Some(target_id) = self.remap(ReferenceKind::TitleField, &source_id, owner).await?
                {
                    config.insert("title_field_id".to_string(), Value::from(target_id.as_str()));
                }
            }
        }

        Ok(())
    }

    /// Source id -> natural key
    async fn source_key(
        &mut self,
        kind: ReferenceKind,
        source_id: &EntityId,
        owner: &str,
    ) -> Result<ReferenceKey> {
        if let Some(key) = self.source_keys.get(&(kind, source_id.clone())) {
            return Ok(key.clone());
        }

        let environment = self.source.environment().to_string();
        let unresolved = |e: Error| Error::Resolution {
            kind,
            reference: source_id.to_string(),
            reason: format!("lookup in '{}' failed: {}", environment, e),
        };

        let key = match kind {
            ReferenceKind::ItemType => {
                ReferenceKey::ItemType(self.source_api_key(source_id).await.map_err(unresolved)?)
            }
            ReferenceKind::Fieldset => {
                let fieldset = self.source.find_fieldset(source_id).await.map_err(unresolved)?;
                ReferenceKey::Fieldset {
                    owner: owner.to_string(),
                    title: fieldset.title,
                }
            }
            ReferenceKind::PluginAddon => {
                let plugin = self.source.find_plugin(source_id).await.map_err(unresolved)?;
                ReferenceKey::Plugin(plugin.natural_key())
            }
            ReferenceKind::TitleField => {
                let field = self.source.find_field(source_id).await.map_err(unresolved)?;
                let field_owner = self
                    .source_api_key(&field.item_type)
                    .await
                    .map_err(unresolved)?;
                ReferenceKey::Field {
                    owner: field_owner,
                    api_key: field.api_key,
                }
            }
        };

        self.source_keys
            .insert((kind, source_id.clone()), key.clone());
        Ok(key)
    }

    /// Api key of a source item type, from the index or a live lookup
    async fn source_api_key(&mut self, id: &EntityId) -> Result<String> {
        if let Some(api_key) = self.source_item_types.get(id) {
            return Ok(api_key.clone());
        }
        let item_type = self.source.find_item_type(id.as_str()).await?;
        self.source_item_types
            .insert(id.clone(), item_type.api_key.clone());
        Ok(item_type.api_key)
    }

    /// Target id of an item type, from the index or a live lookup by api_key
    async fn target_item_type_id(&mut self, api_key: &str) -> Result<EntityId> {
        let key = ReferenceKey::ItemType(api_key.to_string());
        if let Some(id) = self.target_ids.get(&key) {
            return Ok(id.clone());
        }
        let item_type = self.target.find_item_type(api_key).await?;
        self.target_ids.insert(key, item_type.id.clone());
        Ok(item_type.id)
    }

    /// Natural key -> target id
    async fn target_id(&mut self, key: &ReferenceKey) -> Result<EntityId> {
        if let Some(id) = self.target_ids.get(key) {
            return Ok(id.clone());
        }

        let environment = self.target.environment().to_string();
        match key {
            ReferenceKey::ItemType(api_key) => self.target_item_type_id(api_key).await,
            ReferenceKey::Fieldset { owner, title } => {
                let fieldsets = self.target.list_fieldsets(owner).await?;
                self.index_target_fieldsets(owner, &fieldsets);
                self.target_ids
                    .get(key)
                    .cloned()
                    .ok_or_else(|| Error::not_found("fieldset", format!("{} in {}", title, owner), &environment))
            }
            ReferenceKey::Plugin(plugin_key) => {
                let plugins = self.target.list_plugins().await?;
                self.index_target_plugins(&plugins);
                self.target_ids
                    .get(key)
                    .cloned()
                    .ok_or_else(|| Error::not_found("plugin", plugin_key.to_string(), &environment))
            }
            ReferenceKey::Field { owner, api_key } => {
                let owner_id = self.target_item_type_id(owner).await?;
                let field = self
                    .target
                    .list_fields(owner_id.as_str())
                    .await?
                    .into_iter()
                    .find(|f| &f.api_key == api_key)
                    .ok_or_else(|| Error::not_found("field", key.to_string(), &environment))?;
                self.target_ids.insert(key.clone(), field.id.clone());
                Ok(field.id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryEnvironment;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    /// Source and target sharing `author` and `post` under different ids
    async fn environments() -> (InMemoryEnvironment, InMemoryEnvironment) {
        let source = InMemoryEnvironment::new("development", 100);
        let target = InMemoryEnvironment::new("production", 900);
        for env in [&source, &target] {
            env.create_item_type(payload(json!({"api_key": "author"})))
                .await
                .unwrap();
            env.create_item_type(payload(json!({"api_key": "post"})))
                .await
                .unwrap();
        }
        (source, target)
    }

    async fn remapper<'a>(
        source: &'a InMemoryEnvironment,
        target: &'a InMemoryEnvironment,
    ) -> ReferenceRemapper<'a> {
        let source_types = source.list_item_types().await.unwrap();
        let target_types = target.list_item_types().await.unwrap();
        ReferenceRemapper::new(source, target, &source_types, &target_types)
    }

    #[test]
    fn test_policies() {
        assert_eq!(ReferenceKind::ItemType.policy(), ResolutionPolicy::Fatal);
        assert_eq!(ReferenceKind::TitleField.policy(), ResolutionPolicy::Fatal);
        assert_eq!(ReferenceKind::Fieldset.policy(), ResolutionPolicy::BestEffort);
        assert_eq!(ReferenceKind::PluginAddon.policy(), ResolutionPolicy::BestEffort);
    }

    #[tokio::test]
    async fn test_validator_item_types_rewritten_to_target_ids() {
        let (source, target) = environments().await;
        let source_author = source.find_item_type("author").await.unwrap();
        let target_author = target.find_item_type("author").await.unwrap();
        assert_ne!(source_author.id, target_author.id);

        let mut remapper = remapper(&source, &target).await;
        let mut field = payload(json!({
            "api_key": "writer",
            "validators": {"item_item_type": {"item_types": [source_author.id]}}
        }));
        remapper.remap_field(&mut field, "post").await.unwrap();

        assert_eq!(
            field["validators"]["item_item_type"]["item_types"],
            json!([target_author.id])
        );
    }

    #[tokio::test]
    async fn test_item_type_created_after_snapshot_found_live() {
        let (source, target) = environments().await;
        let mut remapper = remapper(&source, &target).await;

        let source_tag = source
            .create_item_type(payload(json!({"api_key": "tag"})))
            .await
            .unwrap();
        let target_tag = target
            .create_item_type(payload(json!({"api_key": "tag"})))
            .await
            .unwrap();

        let resolved = remapper
            .resolve(ReferenceKind::ItemType, &source_tag.id, "post")
            .await
            .unwrap();
        assert_eq!(resolved, target_tag.id);
    }

    #[tokio::test]
    async fn test_missing_item_type_is_fatal() {
        let (source, target) = environments().await;
        let source_only = source
            .create_item_type(payload(json!({"api_key": "source_only"})))
            .await
            .unwrap();
        let mut remapper = remapper(&source, &target).await;

        let mut field = payload(json!({
            "validators": {"rich_text_blocks": {"item_types": [source_only.id]}}
        }));
        let err = remapper.remap_field(&mut field, "post").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution {
                kind: ReferenceKind::ItemType,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_non_string_item_type_entry_is_fatal() {
        let (source, target) = environments().await;
        let mut remapper = remapper(&source, &target).await;

        let mut field = payload(json!({
            "validators": {"item_item_type": {"item_types": [101]}}
        }));
        let err = remapper.remap_field(&mut field, "post").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution {
                kind: ReferenceKind::ItemType,
                ..
            }
        ));
        assert_eq!(field["validators"]["item_item_type"]["item_types"], json!([101]));
    }

    #[tokio::test]
    async fn test_title_field_resolved_through_owner() {
        let (source, target) = environments().await;
        let source_title = source
            .create_field("post", payload(json!({"api_key": "title", "position": 1})))
            .await
            .unwrap();
        target
            .create_field("post", payload(json!({"api_key": "body", "position": 1})))
            .await
            .unwrap();
        let target_title = target
            .create_field("post", payload(json!({"api_key": "title", "position": 2})))
            .await
            .unwrap();

        let mut remapper = remapper(&source, &target).await;
        let mut field = payload(json!({
            "api_key": "slug",
            "validators": {"slug_title_field": {"title_field_id": source_title.id}}
        }));
        remapper.remap_field(&mut field, "post").await.unwrap();

        assert_eq!(
            field["validators"]["slug_title_field"]["title_field_id"],
            json!(target_title.id)
        );
    }

    #[tokio::test]
    async fn test_missing_title_field_is_fatal() {
        let (source, target) = environments().await;
        let source_title = source
            .create_field("post", payload(json!({"api_key": "title"})))
            .await
            .unwrap();

        let mut remapper = remapper(&source, &target).await;
        let mut field = payload(json!({
            "validators": {"slug_title_field": {"title_field_id": source_title.id}}
        }));
        assert!(remapper.remap_field(&mut field, "post").await.is_err());
    }

    #[tokio::test]
    async fn test_fieldset_resolved_by_title() {
        let (source, target) = environments().await;
        let source_main = source
            .create_fieldset("post", payload(json!({"title": "Main"})))
            .await
            .unwrap();
        let target_main = target
            .create_fieldset("post", payload(json!({"title": "Main"})))
            .await
            .unwrap();

        let mut remapper = remapper(&source, &target).await;
        remapper.index_target_fieldsets("post", &target.list_fieldsets("post").await.unwrap());

        let mut field = payload(json!({"api_key": "title", "fieldset": source_main.id}));
        remapper.remap_field(&mut field, "post").await.unwrap();
        assert_eq!(field["fieldset"], json!(target_main.id));
    }

    #[tokio::test]
    async fn test_unresolved_fieldset_detaches_with_warning() {
        let (source, target) = environments().await;
        let source_sidebar = source
            .create_fieldset("post", payload(json!({"title": "Sidebar"})))
            .await
            .unwrap();

        let mut remapper = remapper(&source, &target).await;
        let mut field = payload(json!({"api_key": "title", "fieldset": source_sidebar.id}));
        remapper.remap_field(&mut field, "post").await.unwrap();

        assert_eq!(field["fieldset"], Value::Null);
        assert_eq!(remapper.take_warnings().len(), 1);
        assert!(remapper.take_warnings().is_empty());
    }

    #[tokio::test]
    async fn test_addons_remapped_by_package_name() {
        let (source, target) = environments().await;
        let source_plugin = source
            .create_plugin(payload(json!({"package_name": "datocms-plugin-star-rating"})))
            .await
            .unwrap();
        let target_plugin = target
            .create_plugin(payload(json!({"package_name": "datocms-plugin-star-rating"})))
            .await
            .unwrap();

        let mut remapper = remapper(&source, &target).await;
        remapper.index_target_plugins(&target.list_plugins().await.unwrap());

        let mut field = payload(json!({
            "appearance": {"editor": "integer", "parameters": {}, "addons": [
                {"id": source_plugin.id, "parameters": {"max": 5}}
            ]}
        }));
        remapper.remap_field(&mut field, "post").await.unwrap();

        assert_eq!(
            field["appearance"]["addons"][0],
            json!({"id": target_plugin.id, "parameters": {"max": 5}})
        );
    }

    #[tokio::test]
    async fn test_unresolved_addon_keeps_id_and_warns() {
        let (source, target) = environments().await;
        let mut remapper = remapper(&source, &target).await;

        let mut field = payload(json!({
            "appearance": {"addons": [{"id": "4242", "parameters": {}}]}
        }));
        remapper.remap_field(&mut field, "post").await.unwrap();

        assert_eq!(field["appearance"]["addons"][0]["id"], "4242");
        assert_eq!(remapper.take_warnings().len(), 1);
    }
}
