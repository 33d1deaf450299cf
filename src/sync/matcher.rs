// src/sync/matcher.rs

//! Natural-key matching between a source and a target collection
//!
//! Partitions two collections of the same entity type into what must be
//! created, updated or deleted in the target. Matching is exact equality of
//! the natural key: case-sensitive, no normalization, no fuzzy matching.

use crate::schema::{EntityId, Field, Fieldset, ItemType, Plugin};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// Stable identity of an entity across environments
pub trait NaturalKey {
    type Key: Eq + Hash + Clone + fmt::Display;

    fn natural_key(&self) -> Self::Key;

    fn entity_id(&self) -> &EntityId;
}

impl NaturalKey for ItemType {
    type Key = String;

    fn natural_key(&self) -> String {
        self.api_key.clone()
    }

    fn entity_id(&self) -> &EntityId {
        &self.id
    }
}

/// Fields are only ever matched within one owning item type, so the owner
/// half of their identity is implied by the collections being compared.
impl NaturalKey for Field {
    type Key = String;

    fn natural_key(&self) -> String {
        self.api_key.clone()
    }

    fn entity_id(&self) -> &EntityId {
        &self.id
    }
}

/// Same scoping as fields: matched within one owning item type.
impl NaturalKey for Fieldset {
    type Key = String;

    fn natural_key(&self) -> String {
        self.title.clone()
    }

    fn entity_id(&self) -> &EntityId {
        &self.id
    }
}

/// Identity of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PluginKey {
    /// Published plugin, identified by its registry package
    Package(String),
    /// Private plugin, identified by the URL it is served from
    Url(String),
    /// Neither package nor URL; only meaningful inside its own environment
    Unidentified(EntityId),
}

impl PluginKey {
    /// Whether the key can match a plugin of another environment
    pub fn is_identified(&self) -> bool {
        !matches!(self, PluginKey::Unidentified(_))
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKey::Package(name) => write!(f, "{}", name),
            PluginKey::Url(url) => write!(f, "{}", url),
            PluginKey::Unidentified(id) => write!(f, "<plugin {} without package or url>", id),
        }
    }
}

impl NaturalKey for Plugin {
    type Key = PluginKey;

    fn natural_key(&self) -> PluginKey {
        match (&self.package_name, &self.url) {
            (Some(name), _) => PluginKey::Package(name.clone()),
            (None, Some(url)) => PluginKey::Url(url.clone()),
            (None, None) => PluginKey::Unidentified(self.id.clone()),
        }
    }

    fn entity_id(&self) -> &EntityId {
        &self.id
    }
}

/// Split off plugins that cannot be matched across environments
///
/// Returns `(identified, unidentified)`. Unidentified plugins never match
/// across environments and are left out of reconciliation.
pub fn split_unidentified(plugins: Vec<Plugin>) -> (Vec<Plugin>, Vec<Plugin>) {
    plugins
        .into_iter()
        .partition(|plugin| plugin.natural_key().is_identified())
}

/// A source entity paired with the target entity sharing its natural key
#[derive(Debug, Clone)]
pub struct Matched<'a, T> {
    pub source: &'a T,
    pub target: &'a T,
}

impl<T: NaturalKey> Matched<'_, T> {
    /// Id under which the update is sent: always the target's
    pub fn target_id(&self) -> &EntityId {
        self.target.entity_id()
    }
}

/// Result of matching a source collection against a target collection
#[derive(Debug)]
pub struct Reconciliation<'a, T> {
    /// Source entities with no target counterpart, in source order
    pub to_create: Vec<&'a T>,
    /// Source entities with a target counterpart, in source order
    pub to_update: Vec<Matched<'a, T>>,
    /// Target entities with no source counterpart, in target order
    pub to_delete: Vec<&'a T>,
}

/// Match `source` against `target` by natural key
pub fn reconcile<'a, T: NaturalKey>(source: &'a [T], target: &'a [T]) -> Reconciliation<'a, T> {
    let mut target_by_key: HashMap<T::Key, &'a T> = HashMap::with_capacity(target.len());
    for entity in target {
        target_by_key.entry(entity.natural_key()).or_insert(entity);
    }

    let mut to_create = Vec::new();
    let mut to_update = Vec::new();
    let mut source_keys = HashSet::with_capacity(source.len());

    for entity in source {
        let key = entity.natural_key();
        match target_by_key.get(&key) {
            Some(existing) => to_update.push(Matched {
                source: entity,
                target: *existing,
            }),
            None => to_create.push(entity),
        }
        source_keys.insert(key);
    }

    let to_delete = target
        .iter()
        .filter(|entity| !source_keys.contains(&entity.natural_key()))
        .collect();

    Reconciliation {
        to_create,
        to_update,
        to_delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item_type(id: &str, api_key: &str) -> ItemType {
        serde_json::from_value(json!({"id": id, "api_key": api_key})).unwrap()
    }

    fn fieldset(id: &str, title: &str) -> Fieldset {
        serde_json::from_value(json!({"id": id, "title": title})).unwrap()
    }

    fn keys<'a>(items: &[&'a ItemType]) -> Vec<&'a str> {
        items.iter().map(|t| t.api_key.as_str()).collect()
    }

    #[test]
    fn test_blog_post_and_author_scenario() {
        let source = vec![item_type("1", "blog_post"), item_type("2", "author")];
        let target = vec![item_type("900", "blog_post")];

        let result = reconcile(&source, &target);
        assert_eq!(keys(&result.to_create), vec!["author"]);
        assert_eq!(result.to_update.len(), 1);
        assert_eq!(result.to_update[0].source.api_key, "blog_post");
        assert_eq!(result.to_update[0].target_id().as_str(), "900");
        assert!(result.to_delete.is_empty());
    }

    #[test]
    fn test_equal_keys_always_update() {
        let source = vec![item_type("1", "a"), item_type("2", "b"), item_type("3", "c")];
        let target = vec![item_type("30", "c"), item_type("10", "a"), item_type("20", "b")];

        let result = reconcile(&source, &target);
        assert!(result.to_create.is_empty());
        assert!(result.to_delete.is_empty());
        assert_eq!(result.to_update.len(), 3);
        for matched in &result.to_update {
            assert_eq!(matched.source.api_key, matched.target.api_key);
        }
    }

    #[test]
    fn test_stale_target_only_deleted() {
        let source = vec![item_type("1", "post")];
        let target = vec![item_type("10", "post"), item_type("11", "legacy")];

        let result = reconcile(&source, &target);
        assert_eq!(keys(&result.to_delete), vec!["legacy"]);
        assert!(result.to_create.iter().all(|t| t.api_key != "legacy"));
        assert!(result.to_update.iter().all(|m| m.source.api_key != "legacy"));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let source = vec![item_type("1", "Post")];
        let target = vec![item_type("10", "post")];

        let result = reconcile(&source, &target);
        assert_eq!(keys(&result.to_create), vec!["Post"]);
        assert_eq!(keys(&result.to_delete), vec!["post"]);
    }

    #[test]
    fn test_fieldsets_match_by_title() {
        let source = vec![fieldset("5", "Main")];
        let target = vec![fieldset("55", "Main")];

        let result = reconcile(&source, &target);
        assert!(result.to_create.is_empty());
        assert!(result.to_delete.is_empty());
        assert_eq!(result.to_update[0].target_id().as_str(), "55");
    }

    #[test]
    fn test_private_plugins_match_by_url() {
        let source: Vec<Plugin> = vec![
            serde_json::from_value(json!({"id": "1", "package_name": "datocms-plugin-star-rating"})).unwrap(),
            serde_json::from_value(json!({"id": "2", "url": "https://example.com/a"})).unwrap(),
        ];
        let target: Vec<Plugin> = vec![
            serde_json::from_value(json!({"id": "8", "url": "https://example.com/b"})).unwrap(),
            serde_json::from_value(json!({"id": "9", "url": "https://example.com/a"})).unwrap(),
        ];

        let result = reconcile(&source, &target);
        assert_eq!(result.to_create.len(), 1);
        assert_eq!(result.to_update[0].target_id().as_str(), "9");
        assert_eq!(result.to_delete[0].id.as_str(), "8");
    }

    #[test]
    fn test_plugins_without_package_or_url_stay_distinct() {
        let plugins: Vec<Plugin> = vec![
            serde_json::from_value(json!({"id": "1"})).unwrap(),
            serde_json::from_value(json!({"id": "2"})).unwrap(),
            serde_json::from_value(json!({"id": "3", "url": "https://example.com/a"})).unwrap(),
        ];
        assert_ne!(plugins[0].natural_key(), plugins[1].natural_key());
        assert!(!plugins[0].natural_key().is_identified());

        let (identified, unidentified) = split_unidentified(plugins);
        assert_eq!(identified.len(), 1);
        assert_eq!(identified[0].id.as_str(), "3");
        assert_eq!(unidentified.len(), 2);
    }
}
