//! Schema and identifier mapping for tether.
//!
//! - [`Schema`]: record types, their attributes and relationships, plus the
//!   field visibility map consulted when a record is written to a remote
//! - [`KeyMap`]: the bidirectional local id / remote key pairing shared by
//!   every source
//!
//! Both are read-mostly and outlive any single source; share them via `Arc`.

mod error;
mod keymap;
mod schema;

pub use error::{ModelError, ModelResult};
pub use keymap::KeyMap;
pub use schema::{
    AttributeDefinition, AttributeType, FieldAccess, ModelDefinition, RelationshipDefinition,
    RelationshipKind, Schema,
};
