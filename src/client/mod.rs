// src/client/mod.rs
//! Environment client trait and implementations
//!
//! An environment client exposes the CRUD capabilities the reconciler needs
//! against one environment of a site:
//! - Item types (models and blocks), unparented
//! - Fields and fieldsets, parented by an item type
//! - Plugins, unparented
//!
//! Two implementations exist: [`HttpEnvironment`] talks to the Content
//! Management API, [`InMemoryEnvironment`] keeps the schema in process
//! (replayed from a snapshot or built by tests).

mod http;
mod memory;

pub use http::{DEFAULT_API_URL, HttpEnvironment};
pub use memory::{InMemoryEnvironment, Operation};

use crate::error::Result;
use crate::schema::{EntityId, Field, Fieldset, ItemType, Payload, Plugin};
use async_trait::async_trait;

/// CRUD operations against one environment
///
/// `find_*` methods fail with [`crate::Error::NotFound`] when nothing
/// matches. Item type keys accept either an id or an `api_key`; other keys
/// are ids.
#[async_trait]
pub trait EnvironmentClient: Send + Sync {
    /// Name of the environment this client is bound to
    fn environment(&self) -> &str;

    async fn list_item_types(&self) -> Result<Vec<ItemType>>;
    async fn find_item_type(&self, key: &str) -> Result<ItemType>;
    async fn create_item_type(&self, payload: Payload) -> Result<ItemType>;
    async fn update_item_type(&self, id: &EntityId, payload: Payload) -> Result<ItemType>;
    async fn delete_item_type(&self, id: &EntityId) -> Result<()>;

    async fn list_fields(&self, item_type: &str) -> Result<Vec<Field>>;
    async fn find_field(&self, id: &EntityId) -> Result<Field>;
    async fn create_field(&self, item_type: &str, payload: Payload) -> Result<Field>;
    async fn update_field(&self, id: &EntityId, payload: Payload) -> Result<Field>;
    async fn delete_field(&self, id: &EntityId) -> Result<()>;

    async fn list_fieldsets(&self, item_type: &str) -> Result<Vec<Fieldset>>;
    async fn find_fieldset(&self, id: &EntityId) -> Result<Fieldset>;
    async fn create_fieldset(&self, item_type: &str, payload: Payload) -> Result<Fieldset>;
    async fn update_fieldset(&self, id: &EntityId, payload: Payload) -> Result<Fieldset>;
    async fn delete_fieldset(&self, id: &EntityId) -> Result<()>;

    async fn list_plugins(&self) -> Result<Vec<Plugin>>;
    async fn find_plugin(&self, id: &EntityId) -> Result<Plugin>;
    async fn create_plugin(&self, payload: Payload) -> Result<Plugin>;
    async fn update_plugin(&self, id: &EntityId, payload: Payload) -> Result<Plugin>;
    async fn delete_plugin(&self, id: &EntityId) -> Result<()>;
}
