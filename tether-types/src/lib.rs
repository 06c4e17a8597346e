//! Core type definitions for tether.
//!
//! This crate defines the store-agnostic types shared by every source:
//! - Record identifiers (locally minted UUID v7 strings) and transform ids
//! - [`Record`], the unit of data held by a source
//! - [`Operation`] and [`Transform`], the immutable batch that sources commit
//!   and strategies replicate
//!
//! Schema-aware validation lives in `tether-model`; this crate only knows
//! the shape of the data.

mod ids;
mod record;
mod transform;

pub use ids::{RecordId, RecordIdentity, TransformId};
pub use record::{Record, RelationshipData};
pub use transform::{Operation, Transform};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
