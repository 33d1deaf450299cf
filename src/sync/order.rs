// src/sync/order.rs

//! Dependency ordering
//!
//! Blocks can be embedded by models, so blocks are written first. Fields are
//! written in source position order. Phases run in a fixed order since
//! fields reference plugins, fieldsets and item types.

use super::matcher::Matched;
use crate::schema::{Field, ItemType};
use std::cmp::Ordering;
use std::fmt;

/// Comparator placing blocks before models; same kinds compare equal
pub fn blocks_first(a: &ItemType, b: &ItemType) -> Ordering {
    match (a.modular_block, b.modular_block) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Stable sort of item types, blocks first
pub fn order_blocks_first(item_types: &mut [ItemType]) {
    item_types.sort_by(blocks_first);
}

/// Stable sort of fields slated for creation by position
pub fn order_fields_by_position(fields: &mut [&Field]) {
    fields.sort_by_key(|f| f.position);
}

/// Stable sort of matched fields by their source position
pub fn order_matches_by_position(matches: &mut [Matched<'_, Field>]) {
    matches.sort_by_key(|m| m.source.position);
}

/// Migration phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Plugins,
    ItemTypes,
    Fieldsets,
    Fields,
}

impl Phase {
    /// Execution order; later phases reference entities of earlier ones
    pub const SEQUENCE: [Phase; 4] = [
        Phase::Plugins,
        Phase::ItemTypes,
        Phase::Fieldsets,
        Phase::Fields,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Plugins => "plugins",
            Phase::ItemTypes => "blocks and models",
            Phase::Fieldsets => "fieldsets",
            Phase::Fields => "fields",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
