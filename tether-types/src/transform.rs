//! Operations and transforms.
//!
//! A transform is the unit of replication: an ordered batch of record
//! operations with a stable id. Sources produce transforms when they commit
//! and strategies carry them, unchanged, to other sources. A transform is
//! never mutated after creation; a source that needs to add information
//! (e.g. a remote-assigned id) produces a new transform instead.

use crate::{Record, RecordIdentity, TransformId};
use serde::{Deserialize, Serialize};

/// A single record operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "camelCase")]
pub enum Operation {
    /// Adds a record, replacing any existing attributes and relationships.
    /// Keys are merged so that an identifier pairing is never lost.
    AddRecord(Record),

    /// Merges a partial record into an existing one.
    UpdateRecord(Record),

    /// Removes a record.
    RemoveRecord(RecordIdentity),
}

impl Operation {
    /// Identity of the record this operation affects.
    pub fn identity(&self) -> RecordIdentity {
        match self {
            Self::AddRecord(record) | Self::UpdateRecord(record) => record.identity(),
            Self::RemoveRecord(identity) => identity.clone(),
        }
    }

    /// The record carried by the operation, if any.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::AddRecord(record) | Self::UpdateRecord(record) => Some(record),
            Self::RemoveRecord(_) => None,
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddRecord(_) => "addRecord",
            Self::UpdateRecord(_) => "updateRecord",
            Self::RemoveRecord(_) => "removeRecord",
        }
    }
}

/// An immutable, ordered batch of operations.
///
/// Operations inside a transform apply atomically: listeners never observe
/// a partially applied transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    id: TransformId,
    operations: Vec<Operation>,
}

impl Transform {
    /// Creates a transform with a fresh id.
    #[must_use]
    pub fn new(operations: Vec<Operation>) -> Self {
        Self::with_id(TransformId::new(), operations)
    }

    /// Creates a transform with a known id.
    #[must_use]
    pub fn with_id(id: TransformId, operations: Vec<Operation>) -> Self {
        Self { id, operations }
    }

    /// Creates a single-operation transform adding `record`.
    #[must_use]
    pub fn add_record(record: Record) -> Self {
        Self::new(vec![Operation::AddRecord(record)])
    }

    /// Creates a single-operation transform merging `record`.
    #[must_use]
    pub fn update_record(record: Record) -> Self {
        Self::new(vec![Operation::UpdateRecord(record)])
    }

    /// Creates a single-operation transform removing `identity`.
    #[must_use]
    pub fn remove_record(identity: RecordIdentity) -> Self {
        Self::new(vec![Operation::RemoveRecord(identity)])
    }

    /// The transform's id.
    pub fn id(&self) -> TransformId {
        self.id
    }

    /// The operations, in application order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Consumes the transform, returning its operations.
    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the transform carries no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Records carried by add and update operations.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.operations.iter().filter_map(Operation::record)
    }
}
