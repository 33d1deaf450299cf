// src/schema.rs

//! Schema entities of one environment
//!
//! Every entity carries the environment-local `id` the API assigned to it,
//! the attributes the reconciler reasons about as typed fields, and every
//! other attribute verbatim in a flattened map. Nothing here is shared
//! between environments: equivalence is established through natural keys
//! (see [`crate::sync::matcher`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A JSON object sent as the body of a create or update request
pub type Payload = Map<String, Value>;

/// Environment-local identifier of an entity
///
/// The API serialises numeric ids as strings; they are opaque to us and only
/// meaningful inside the environment that issued them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Entity types the reconciler manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    ItemType,
    Field,
    Fieldset,
    Plugin,
}

impl EntityKind {
    /// Human-readable name, also used in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::ItemType => "item type",
            EntityKind::Field => "field",
            EntityKind::Fieldset => "fieldset",
            EntityKind::Plugin => "plugin",
        }
    }

    /// JSON:API resource type
    pub fn resource_type(&self) -> &'static str {
        match self {
            EntityKind::ItemType => "item_type",
            EntityKind::Field => "field",
            EntityKind::Fieldset => "fieldset",
            EntityKind::Plugin => "plugin",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content model or a modular block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemType {
    pub id: EntityId,
    pub api_key: String,
    /// Reusable embeddable type rather than a top-level model
    #[serde(default)]
    pub modular_block: bool,
    #[serde(flatten)]
    pub attributes: Payload,
}

impl ItemType {
    /// "block" or "model", for log messages
    pub fn kind_label(&self) -> &'static str {
        if self.modular_block { "block" } else { "model" }
    }
}

/// A plugin reference attached to a field editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Addon {
    /// Id of the plugin providing the addon
    pub id: EntityId,
    #[serde(flatten)]
    pub extra: Payload,
}

/// Presentation descriptor of a field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    #[serde(default)]
    pub parameters: Payload,
    #[serde(default)]
    pub addons: Vec<Addon>,
    #[serde(flatten)]
    pub extra: Payload,
}

/// A field of an item type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: EntityId,
    /// Unique within the owning item type
    pub api_key: String,
    /// Owning item type
    pub item_type: EntityId,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub fieldset: Option<EntityId>,
    #[serde(default)]
    pub appearance: Appearance,
    /// Validator name -> configuration; may embed `item_types` and `title_field_id`
    #[serde(default)]
    pub validators: Payload,
    #[serde(flatten)]
    pub attributes: Payload,
}

/// A named group of fields within one item type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fieldset {
    pub id: EntityId,
    /// Unique within the owning item type
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<EntityId>,
    #[serde(flatten)]
    pub attributes: Payload,
}

/// An editor plugin installed in an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: EntityId,
    /// Registry package; absent for private plugins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub attributes: Payload,
}

impl Plugin {
    /// Package name if published, otherwise the plugin URL
    pub fn display_name(&self) -> &str {
        self.package_name
            .as_deref()
            .or(self.url.as_deref())
            .unwrap_or("<unnamed>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_keeps_unknown_attributes() {
        let field: Field = serde_json::from_value(json!({
            "id": "10",
            "api_key": "title",
            "item_type": "1",
            "position": 2,
            "label": "Title",
            "field_type": "string",
            "validators": {"required": {}},
            "appearance": {"editor": "single_line", "parameters": {"heading": true}, "addons": []}
        }))
        .unwrap();

        assert_eq!(field.id.as_str(), "10");
        assert_eq!(field.position, 2);
        assert!(field.fieldset.is_none());
        assert_eq!(field.attributes.get("label"), Some(&json!("Title")));
        assert_eq!(field.appearance.editor.as_deref(), Some("single_line"));
    }

    #[test]
    fn test_addon_round_trip_preserves_parameters() {
        let addon: Addon = serde_json::from_value(json!({
            "id": "77",
            "parameters": {"color": "red"}
        }))
        .unwrap();
        let value = serde_json::to_value(&addon).unwrap();
        assert_eq!(value, json!({"id": "77", "parameters": {"color": "red"}}));
    }

    #[test]
    fn test_plugin_display_name_falls_back_to_url() {
        let plugin: Plugin = serde_json::from_value(json!({
            "id": "3",
            "url": "https://plugins.example.com/star-rating"
        }))
        .unwrap();
        assert_eq!(plugin.display_name(), "https://plugins.example.com/star-rating");
    }

    #[test]
    fn test_item_type_kind_label() {
        let block: ItemType = serde_json::from_value(json!({
            "id": "1", "api_key": "cta", "modular_block": true
        }))
        .unwrap();
        assert_eq!(block.kind_label(), "block");
    }
}
