// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use envsync::{EntityId, EnvironmentClient, Field, InMemoryEnvironment, Payload};
use serde_json::{Value, json};

pub const STAR_RATING: &str = "datocms-plugin-star-rating";

pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => panic!("payload must be an object"),
    }
}

/// Source environment of a small blog.
///
/// - block `cta` with field `label`
/// - model `blog_post` with fieldset "Main" and fields `title`, `slug`
///   (slug of `title`), `author` (link to `author`) and `rating`
///   (star rating addon)
/// - model `author` with field `name`
/// - plugin `datocms-plugin-star-rating`
pub async fn blog_source() -> InMemoryEnvironment {
    let env = InMemoryEnvironment::new("development", 1);

    let plugin = env
        .create_plugin(payload(json!({"package_name": STAR_RATING, "name": "Star rating"})))
        .await
        .unwrap();

    env.create_item_type(payload(json!({
        "api_key": "blog_post", "name": "Blog post", "modular_block": false, "sortable": true
    })))
    .await
    .unwrap();
    let author = env
        .create_item_type(payload(json!({
            "api_key": "author", "name": "Author", "modular_block": false
        })))
        .await
        .unwrap();
    env.create_item_type(payload(json!({
        "api_key": "cta", "name": "Call to action", "modular_block": true
    })))
    .await
    .unwrap();

    let main = env
        .create_fieldset("blog_post", payload(json!({"title": "Main", "collapsible": false})))
        .await
        .unwrap();

    let title = env
        .create_field(
            "blog_post",
            payload(json!({
                "api_key": "title", "label": "Title", "field_type": "string",
                "position": 1, "fieldset": main.id
            })),
        )
        .await
        .unwrap();
    env.create_field(
        "blog_post",
        payload(json!({
            "api_key": "slug", "label": "Slug", "field_type": "slug", "position": 2,
            "validators": {"slug_title_field": {"title_field_id": title.id}}
        })),
    )
    .await
    .unwrap();
    env.create_field(
        "blog_post",
        payload(json!({
            "api_key": "author", "label": "Author", "field_type": "link", "position": 3,
            "validators": {"item_item_type": {"item_types": [author.id]}}
        })),
    )
    .await
    .unwrap();
    env.create_field(
        "blog_post",
        payload(json!({
            "api_key": "rating", "label": "Rating", "field_type": "integer", "position": 4,
            "appearance": {"editor": "integer", "parameters": {}, "addons": [
                {"id": plugin.id, "parameters": {"max": 5}}
            ]}
        })),
    )
    .await
    .unwrap();

    env.create_field(
        "author",
        payload(json!({"api_key": "name", "label": "Name", "field_type": "string", "position": 1})),
    )
    .await
    .unwrap();
    env.create_field(
        "cta",
        payload(json!({"api_key": "label", "label": "Label", "field_type": "string", "position": 1})),
    )
    .await
    .unwrap();

    env.clear_operations();
    env
}

/// Target environment that only knows `blog_post`, with a stale field,
/// plus a stale model `old_page`.
pub async fn blog_target() -> InMemoryEnvironment {
    let env = InMemoryEnvironment::new("migration-test", 5000);

    env.create_item_type(payload(json!({
        "api_key": "blog_post", "name": "Post", "modular_block": false, "sortable": false
    })))
    .await
    .unwrap();
    env.create_field(
        "blog_post",
        payload(json!({"api_key": "legacy", "label": "Legacy", "field_type": "text", "position": 1})),
    )
    .await
    .unwrap();
    env.create_item_type(payload(json!({"api_key": "old_page", "modular_block": false})))
        .await
        .unwrap();

    env.clear_operations();
    env
}

pub async fn field(env: &InMemoryEnvironment, owner: &str, api_key: &str) -> Field {
    env.list_fields(owner)
        .await
        .unwrap()
        .into_iter()
        .find(|f| f.api_key == api_key)
        .unwrap_or_else(|| panic!("{}.{} missing in {}", owner, api_key, env.environment()))
}

pub async fn item_type_id(env: &InMemoryEnvironment, api_key: &str) -> EntityId {
    env.find_item_type(api_key).await.unwrap().id
}
