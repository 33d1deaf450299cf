// src/sync/sanitize.rs

//! Payload shaping
//!
//! Turns entities read from an environment into create/update payloads by
//! removing what is environment-local, computed by the API, or rejected when
//! echoed back. Update targets travel separately as the target id.

use crate::error::Result;
use crate::schema::{Field, Fieldset, ItemType, Payload, Plugin};
use serde::Serialize;
use serde_json::Value;

/// Item type attributes that are never copied between environments
///
/// Relationships point at environment-local entities and are rebuilt by the
/// target itself; singleton and collection appearance are presentation state.
pub const ITEM_TYPE_LOCAL_ATTRIBUTES: &[&str] = &[
    "id",
    "meta",
    "has_singleton_item",
    "singleton_item",
    "collection_appearance",
    "fields",
    "fieldsets",
    "title_field",
    "image_preview_field",
    "excerpt_field",
    "ordering_field",
    "presentation_title_field",
    "presentation_image_field",
    "workflow",
];

/// The owner is implied by the endpoint a field is written to
pub const FIELD_LOCAL_ATTRIBUTES: &[&str] = &["id", "item_type"];

pub const FIELDSET_LOCAL_ATTRIBUTES: &[&str] = &["id", "item_type"];

pub const PLUGIN_LOCAL_ATTRIBUTES: &[&str] = &["id"];

fn strip<T: Serialize>(entity: &T, local: &[&str]) -> Result<Payload> {
    let mut payload = match serde_json::to_value(entity)? {
        Value::Object(map) => map,
        _ => Payload::new(),
    };
    for key in local {
        payload.remove(*key);
    }
    Ok(payload)
}

pub fn item_type_payload(item_type: &ItemType) -> Result<Payload> {
    strip(item_type, ITEM_TYPE_LOCAL_ATTRIBUTES)
}

pub fn field_payload(field: &Field) -> Result<Payload> {
    strip(field, FIELD_LOCAL_ATTRIBUTES)
}

pub fn fieldset_payload(fieldset: &Fieldset) -> Result<Payload> {
    strip(fieldset, FIELDSET_LOCAL_ATTRIBUTES)
}

pub fn plugin_payload(plugin: &Plugin) -> Result<Payload> {
    strip(plugin, PLUGIN_LOCAL_ATTRIBUTES)
}

/// Whether sending `payload` would change an entity currently shaped as `current`
///
/// Only the keys present in the payload are compared; an absent key in
/// `current` counts as `null`.
pub fn differs(payload: &Payload, current: &Payload) -> bool {
    payload
        .iter()
        .any(|(key, value)| current.get(key).unwrap_or(&Value::Null) != value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_type_payload_drops_local_state() {
        let item_type: ItemType = serde_json::from_value(json!({
            "id": "12",
            "api_key": "home",
            "name": "Home",
            "modular_block": false,
            "singleton": true,
            "has_singleton_item": true,
            "collection_appearance": "table",
            "title_field": "99"
        }))
        .unwrap();

        let payload = item_type_payload(&item_type).unwrap();
        assert!(!payload.contains_key("id"));
        assert!(!payload.contains_key("has_singleton_item"));
        assert!(!payload.contains_key("collection_appearance"));
        assert!(!payload.contains_key("title_field"));
        assert_eq!(payload["api_key"], "home");
        assert_eq!(payload["singleton"], true);
        assert_eq!(payload["modular_block"], false);
    }

    #[test]
    fn test_field_payload_drops_id_and_owner() {
        let field: Field = serde_json::from_value(json!({
            "id": "40", "api_key": "title", "item_type": "12", "position": 1,
            "fieldset": "7", "label": "Title"
        }))
        .unwrap();

        let payload = field_payload(&field).unwrap();
        assert!(!payload.contains_key("id"));
        assert!(!payload.contains_key("item_type"));
        assert_eq!(payload["fieldset"], "7");
        assert_eq!(payload["label"], "Title");
    }

    #[test]
    fn test_fieldset_payload_drops_owner() {
        let fieldset: Fieldset = serde_json::from_value(json!({
            "id": "7", "title": "Main", "item_type": "12", "collapsible": true
        }))
        .unwrap();

        let payload = fieldset_payload(&fieldset).unwrap();
        assert_eq!(payload.len(), 2);
        assert_eq!(payload["title"], "Main");
    }

    #[test]
    fn test_differs_compares_payload_keys_only() {
        let payload = json!({"name": "Post", "sortable": true}).as_object().cloned().unwrap();
        let same = json!({"name": "Post", "sortable": true, "extra": 1}).as_object().cloned().unwrap();
        let changed = json!({"name": "Post", "sortable": false}).as_object().cloned().unwrap();
        let missing = json!({"name": "Post"}).as_object().cloned().unwrap();

        assert!(!differs(&payload, &same));
        assert!(differs(&payload, &changed));
        assert!(differs(&payload, &missing));
    }
}
