use crate::{AttributeType, RelationshipKind};
use tether_types::RecordId;
use thiserror::Error;

/// Errors raised while parsing a schema or validating records against it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("model {model} has no attribute {attribute}")]
    UnknownAttribute { model: String, attribute: String },

    #[error("model {model} has no relationship {relationship}")]
    UnknownRelationship { model: String, relationship: String },

    #[error("attribute {model}.{attribute} expects a {expected} value")]
    AttributeType {
        model: String,
        attribute: String,
        expected: AttributeType,
    },

    #[error("relationship {model}.{relationship} links {expected} records, got {found}")]
    RelationshipModel {
        model: String,
        relationship: String,
        expected: String,
        found: String,
    },

    #[error("relationship {model}.{relationship} is {expected}")]
    RelationshipShape {
        model: String,
        relationship: String,
        expected: RelationshipKind,
    },

    /// The proposed pairing contradicts one already in the key map.
    #[error("{record_type}:{id} cannot take {key}={value}: conflicts with an existing pairing")]
    KeyConflict {
        record_type: String,
        key: String,
        value: String,
        id: RecordId,
    },
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidSchema(e.to_string())
    }
}

/// Result type for schema and key map operations.
pub type ModelResult<T> = Result<T, ModelError>;
