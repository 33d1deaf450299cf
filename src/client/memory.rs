// src/client/memory.rs

//! In-process environment
//!
//! Holds a whole schema in memory and behaves like the API for the calls the
//! reconciler makes: ids are allocated from a per-environment counter, keys
//! are unique within their scope, deleting an item type cascades to its
//! fields and fieldsets, and deleting a fieldset detaches its fields. Every
//! write is recorded in an operation log.

use super::EnvironmentClient;
use crate::error::{Error, Result};
use crate::schema::{EntityId, EntityKind, Field, Fieldset, ItemType, Payload, Plugin};
use crate::snapshot::SchemaSnapshot;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A write applied to an in-memory environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create { kind: EntityKind, id: EntityId },
    Update { kind: EntityKind, id: EntityId },
    Delete { kind: EntityKind, id: EntityId },
}

#[derive(Debug, Default)]
struct Store {
    item_types: Vec<ItemType>,
    fields: Vec<Field>,
    fieldsets: Vec<Fieldset>,
    plugins: Vec<Plugin>,
    next_id: u64,
    log: Vec<Operation>,
}

impl Store {
    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId::new(self.next_id.to_string());
        self.next_id += 1;
        id
    }

    fn item_type(&self, key: &str) -> Option<&ItemType> {
        self.item_types
            .iter()
            .find(|t| t.id.as_str() == key || t.api_key == key)
    }
}

/// Environment held entirely in process memory
pub struct InMemoryEnvironment {
    environment: String,
    store: Mutex<Store>,
}

impl InMemoryEnvironment {
    /// Create an empty environment whose ids start at `first_id`
    ///
    /// Give each environment a distinct range so ids never coincide by
    /// accident across environments.
    pub fn new(environment: &str, first_id: u64) -> Self {
        Self {
            environment: environment.to_string(),
            store: Mutex::new(Store {
                next_id: first_id,
                ..Store::default()
            }),
        }
    }

    /// Replay a captured snapshot
    pub fn from_snapshot(snapshot: &SchemaSnapshot) -> Self {
        let highest = snapshot
            .item_types
            .iter()
            .map(|t| &t.id)
            .chain(snapshot.fields.iter().map(|f| &f.id))
            .chain(snapshot.fieldsets.iter().map(|f| &f.id))
            .chain(snapshot.plugins.iter().map(|p| &p.id))
            .filter_map(|id| id.as_str().parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        Self {
            environment: snapshot.environment.clone(),
            store: Mutex::new(Store {
                item_types: snapshot.item_types.clone(),
                fields: snapshot.fields.clone(),
                fieldsets: snapshot.fieldsets.clone(),
                plugins: snapshot.plugins.clone(),
                next_id: highest + 1,
                log: Vec::new(),
            }),
        }
    }

    /// Writes applied so far, in order
    pub fn operations(&self) -> Vec<Operation> {
        self.store.lock().log.clone()
    }

    /// Forget recorded writes (the schema itself is kept)
    pub fn clear_operations(&self) {
        self.store.lock().log.clear();
    }

    fn not_found(&self, kind: EntityKind, key: &str) -> Error {
        Error::not_found(kind.as_str(), key, &self.environment)
    }

    fn conflict(&self, kind: EntityKind, detail: String) -> Error {
        Error::Api {
            method: "POST".to_string(),
            path: format!("/{}", kind.resource_type()),
            status: 422,
            body: detail,
        }
    }
}

/// Build an entity from a payload plus the attributes the store controls
fn materialize<T: DeserializeOwned>(mut payload: Payload, assigned: &[(&str, Value)]) -> Result<T> {
    for (key, value) in assigned {
        payload.insert(key.to_string(), value.clone());
    }
    Ok(serde_json::from_value(Value::Object(payload))?)
}

fn payload_api_key(payload: &Payload) -> String {
    payload
        .get("api_key")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Overlay a payload on an existing entity
fn merge<T: Serialize + DeserializeOwned>(current: &T, payload: Payload) -> Result<T> {
    let mut merged = match serde_json::to_value(current)? {
        Value::Object(map) => map,
        _ => Payload::new(),
    };
    for (key, value) in payload {
        if key == "id" || key == "item_type" {
            continue;
        }
        merged.insert(key, value);
    }
    Ok(serde_json::from_value(Value::Object(merged))?)
}

#[async_trait]
impl EnvironmentClient for InMemoryEnvironment {
    fn environment(&self) -> &str {
        &self.environment
    }

    async fn list_item_types(&self) -> Result<Vec<ItemType>> {
        Ok(self.store.lock().item_types.clone())
    }

    async fn find_item_type(&self, key: &str) -> Result<ItemType> {
        self.store
            .lock()
            .item_type(key)
            .cloned()
            .ok_or_else(|| self.not_found(EntityKind::ItemType, key))
    }

    async fn create_item_type(&self, payload: Payload) -> Result<ItemType> {
        let mut store = self.store.lock();
        let api_key = payload_api_key(&payload);
        if store.item_types.iter().any(|t| t.api_key == api_key) {
            return Err(self.conflict(
                EntityKind::ItemType,
                format!("api_key '{}' is already taken", api_key),
            ));
        }

        let id = store.allocate_id();
        let item_type: ItemType = materialize(payload, &[("id", Value::from(id.as_str()))])?;
        store.item_types.push(item_type.clone());
        store.log.push(Operation::Create {
            kind: EntityKind::ItemType,
            id,
        });
        Ok(item_type)
    }

    async fn update_item_type(&self, id: &EntityId, payload: Payload) -> Result<ItemType> {
        let mut store = self.store.lock();
        let index = store
            .item_types
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| self.not_found(EntityKind::ItemType, id.as_str()))?;

        let updated = merge(&store.item_types[index], payload)?;
        store.item_types[index] = updated.clone();
        store.log.push(Operation::Update {
            kind: EntityKind::ItemType,
            id: id.clone(),
        });
        Ok(updated)
    }

    async fn delete_item_type(&self, id: &EntityId) -> Result<()> {
        let mut store = self.store.lock();
        let before = store.item_types.len();
        store.item_types.retain(|t| &t.id != id);
        if store.item_types.len() == before {
            return Err(self.not_found(EntityKind::ItemType, id.as_str()));
        }

        store.fields.retain(|f| &f.item_type != id);
        store.fieldsets.retain(|f| f.item_type.as_ref() != Some(id));
        store.log.push(Operation::Delete {
            kind: EntityKind::ItemType,
            id: id.clone(),
        });
        Ok(())
    }

    async fn list_fields(&self, item_type: &str) -> Result<Vec<Field>> {
        let store = self.store.lock();
        let owner = store
            .item_type(item_type)
            .ok_or_else(|| self.not_found(EntityKind::ItemType, item_type))?;

        let mut fields: Vec<Field> = store
            .fields
            .iter()
            .filter(|f| f.item_type == owner.id)
            .cloned()
            .collect();
        fields.sort_by_key(|f| f.position);
        Ok(fields)
    }

    async fn find_field(&self, id: &EntityId) -> Result<Field> {
        self.store
            .lock()
            .fields
            .iter()
            .find(|f| &f.id == id)
            .cloned()
            .ok_or_else(|| self.not_found(EntityKind::Field, id.as_str()))
    }

    async fn create_field(&self, item_type: &str, payload: Payload) -> Result<Field> {
        let mut store = self.store.lock();
        let owner = store
            .item_type(item_type)
            .map(|t| t.id.clone())
            .ok_or_else(|| self.not_found(EntityKind::ItemType, item_type))?;

        let api_key = payload_api_key(&payload);
        if store
            .fields
            .iter()
            .any(|f| f.item_type == owner && f.api_key == api_key)
        {
            return Err(self.conflict(
                EntityKind::Field,
                format!("api_key '{}' is already taken in {}", api_key, item_type),
            ));
        }

        let id = store.allocate_id();
        let field: Field = materialize(
            payload,
            &[
                ("id", Value::from(id.as_str())),
                ("item_type", Value::from(owner.as_str())),
            ],
        )?;
        store.fields.push(field.clone());
        store.log.push(Operation::Create {
            kind: EntityKind::Field,
            id,
        });
        Ok(field)
    }

    async fn update_field(&self, id: &EntityId, payload: Payload) -> Result<Field> {
        let mut store = self.store.lock();
        let index = store
            .fields
            .iter()
            .position(|f| &f.id == id)
            .ok_or_else(|| self.not_found(EntityKind::Field, id.as_str()))?;

        let updated = merge(&store.fields[index], payload)?;
        store.fields[index] = updated.clone();
        store.log.push(Operation::Update {
            kind: EntityKind::Field,
            id: id.clone(),
        });
        Ok(updated)
    }

    async fn delete_field(&self, id: &EntityId) -> Result<()> {
        let mut store = self.store.lock();
        let before = store.fields.len();
        store.fields.retain(|f| &f.id != id);
        if store.fields.len() == before {
            return Err(self.not_found(EntityKind::Field, id.as_str()));
        }
        store.log.push(Operation::Delete {
            kind: EntityKind::Field,
            id: id.clone(),
        });
        Ok(())
    }

    async fn list_fieldsets(&self, item_type: &str) -> Result<Vec<Fieldset>> {
        let store = self.store.lock();
        let owner = store
            .item_type(item_type)
            .ok_or_else(|| self.not_found(EntityKind::ItemType, item_type))?;

        Ok(store
            .fieldsets
            .iter()
            .filter(|f| f.item_type.as_ref() == Some(&owner.id))
            .cloned()
            .collect())
    }

    async fn find_fieldset(&self, id: &EntityId) -> Result<Fieldset> {
        self.store
            .lock()
            .fieldsets
            .iter()
            .find(|f| &f.id == id)
            .cloned()
            .ok_or_else(|| self.not_found(EntityKind::Fieldset, id.as_str()))
    }

    async fn create_fieldset(&self, item_type: &str, payload: Payload) -> Result<Fieldset> {
        let mut store = self.store.lock();
        let owner = store
            .item_type(item_type)
            .map(|t| t.id.clone())
            .ok_or_else(|| self.not_found(EntityKind::ItemType, item_type))?;

        let id = store.allocate_id();
        let fieldset: Fieldset = materialize(
            payload,
            &[
                ("id", Value::from(id.as_str())),
                ("item_type", Value::from(owner.as_str())),
            ],
        )?;

        store.fieldsets.push(fieldset.clone());
        store.log.push(Operation::Create {
            kind: EntityKind::Fieldset,
            id,
        });
        Ok(fieldset)
    }

    async fn update_fieldset(&self, id: &EntityId, payload: Payload) -> Result<Fieldset> {
        let mut store = self.store.lock();
        let index = store
            .fieldsets
            .iter()
            .position(|f| &f.id == id)
            .ok_or_else(|| self.not_found(EntityKind::Fieldset, id.as_str()))?;

        let updated = merge(&store.fieldsets[index], payload)?;
        store.fieldsets[index] = updated.clone();
        store.log.push(Operation::Update {
            kind: EntityKind::Fieldset,
            id: id.clone(),
        });
        Ok(updated)
    }

    async fn delete_fieldset(&self, id: &EntityId) -> Result<()> {
        let mut store = self.store.lock();
        let before = store.fieldsets.len();
        store.fieldsets.retain(|f| &f.id != id);
        if store.fieldsets.len() == before {
            return Err(self.not_found(EntityKind::Fieldset, id.as_str()));
        }

        for field in store.fields.iter_mut() {
            if field.fieldset.as_ref() == Some(id) {
                field.fieldset = None;
            }
        }
        store.log.push(Operation::Delete {
            kind: EntityKind::Fieldset,
            id: id.clone(),
        });
        Ok(())
    }

    async fn list_plugins(&self) -> Result<Vec<Plugin>> {
        Ok(self.store.lock().plugins.clone())
    }

    async fn find_plugin(&self, id: &EntityId) -> Result<Plugin> {
        self.store
            .lock()
            .plugins
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| self.not_found(EntityKind::Plugin, id.as_str()))
    }

    async fn create_plugin(&self, payload: Payload) -> Result<Plugin> {
        let mut store = self.store.lock();
        let id = store.allocate_id();
        let plugin: Plugin = materialize(payload, &[("id", Value::from(id.as_str()))])?;

        store.plugins.push(plugin.clone());
        store.log.push(Operation::Create {
            kind: EntityKind::Plugin,
            id,
        });
        Ok(plugin)
    }

    async fn update_plugin(&self, id: &EntityId, payload: Payload) -> Result<Plugin> {
        let mut store = self.store.lock();
        let index = store
            .plugins
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| self.not_found(EntityKind::Plugin, id.as_str()))?;

        let updated = merge(&store.plugins[index], payload)?;
        store.plugins[index] = updated.clone();
        store.log.push(Operation::Update {
            kind: EntityKind::Plugin,
            id: id.clone(),
        });
        Ok(updated)
    }

    async fn delete_plugin(&self, id: &EntityId) -> Result<()> {
        let mut store = self.store.lock();
        let before = store.plugins.len();
        store.plugins.retain(|p| &p.id != id);
        if store.plugins.len() == before {
            return Err(self.not_found(EntityKind::Plugin, id.as_str()));
        }
        store.log.push(Operation::Delete {
            kind: EntityKind::Plugin,
            id: id.clone(),
        });
        Ok(())
    }
}
