// src/sync/mod.rs

//! Schema reconciliation between two environments
//!
//! The reconciler brings a target environment's schema in line with a source
//! environment, strictly in one direction. Entities are matched by natural
//! key, never by id, because ids are local to the environment that issued
//! them:
//!
//! | entity    | natural key                          |
//! |-----------|--------------------------------------|
//! | item type | `api_key`                            |
//! | field     | owner `api_key` + field `api_key`    |
//! | fieldset  | owner `api_key` + `title`            |
//! | plugin    | `package_name` (or `url` if private) |
//!
//! Work runs in fixed phases, plugins, item types, fieldsets, then fields,
//! because fields reference everything else. Field payloads go through the
//! [`ReferenceRemapper`] so every embedded id points into the target.
//!
//! # Example
//!
//! ```ignore
//! let source = HttpEnvironment::new(DEFAULT_API_URL, &token, "development")?;
//! let target = HttpEnvironment::new(DEFAULT_API_URL, &token, "production")?;
//! let report = Migration::new(&source, &target).run().await;
//! println!("{} writes", report.total_writes());
//! ```

pub mod matcher;
pub mod order;
mod orchestrator;
mod plan;
mod remap;
pub mod sanitize;

pub use matcher::{Matched, NaturalKey, PluginKey, Reconciliation, reconcile, split_unidentified};
pub use order::{Phase, blocks_first, order_blocks_first};
pub use orchestrator::{Migration, MigrationReport, PhaseReport};
pub use plan::{SyncAction, SyncPlan, compute_plan};
pub use remap::{ReferenceKind, ReferenceRemapper, ResolutionPolicy};
