// src/lib.rs

//! envsync: one-way schema migration between CMS environments
//!
//! Brings the schema of a target environment (models, blocks, fields,
//! fieldsets and plugins) in line with a source environment of the same
//! site. Content records are never touched.
//!
//! # Architecture
//!
//! - Natural keys: entities are matched across environments by `api_key`,
//!   title or package name, never by id
//! - Phases: plugins, then blocks and models, then fieldsets, then fields
//! - Remapping: every id embedded in a field payload is rewritten to the
//!   id of the same logical entity in the target
//! - Idempotent: a second run against an in-sync target issues no writes

pub mod client;
pub mod config;
mod error;
pub mod schema;
pub mod snapshot;
pub mod sync;

pub use client::{DEFAULT_API_URL, EnvironmentClient, HttpEnvironment, InMemoryEnvironment, Operation};
pub use config::SyncConfig;
pub use error::{Error, Result};
pub use schema::{EntityId, EntityKind, Field, Fieldset, ItemType, Payload, Plugin};
pub use snapshot::{SchemaSnapshot, capture_snapshot};
pub use sync::{
    Migration, MigrationReport, Phase, PhaseReport, ReferenceKind, ReferenceRemapper,
    ResolutionPolicy, SyncAction, SyncPlan, compute_plan,
};
