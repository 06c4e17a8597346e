use crate::{RecordId, RecordIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Linkage of one relationship of a record.
///
/// Serialized untagged: `null` or an identity object for has-one, an array
/// of identities for has-many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    /// At most one related record.
    HasOne(Option<RecordIdentity>),
    /// Any number of related records, in order.
    HasMany(Vec<RecordIdentity>),
}

impl RelationshipData {
    /// All identities referenced by this linkage.
    pub fn identities(&self) -> Vec<&RecordIdentity> {
        match self {
            Self::HasOne(one) => one.iter().collect(),
            Self::HasMany(many) => many.iter().collect(),
        }
    }
}

/// A record held by a source.
///
/// Attributes are arbitrary JSON values whose names and types are declared
/// by the schema. `keys` holds secondary identifiers such as the
/// remote-assigned id (`remoteId`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub record_type: String,
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipData>,
}

impl Record {
    /// Creates an empty record of the given type and id.
    pub fn new(record_type: impl Into<String>, id: impl Into<RecordId>) -> Self {
        Self {
            record_type: record_type.into(),
            id: id.into(),
            keys: BTreeMap::new(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Creates an empty record of the given type with a freshly minted id.
    pub fn create(record_type: impl Into<String>) -> Self {
        Self::new(record_type, RecordId::new())
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets a key (e.g. `remoteId`).
    #[must_use]
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    /// Sets a has-one relationship.
    #[must_use]
    pub fn with_has_one(mut self, name: impl Into<String>, related: Option<RecordIdentity>) -> Self {
        self.relationships
            .insert(name.into(), RelationshipData::HasOne(related));
        self
    }

    /// Sets a has-many relationship.
    #[must_use]
    pub fn with_has_many(mut self, name: impl Into<String>, related: Vec<RecordIdentity>) -> Self {
        self.relationships
            .insert(name.into(), RelationshipData::HasMany(related));
        self
    }

    /// The record's identity.
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(self.record_type.clone(), self.id.clone())
    }

    /// Looks up an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Extracts a string attribute.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|v| v.as_str())
    }

    /// Looks up a key value.
    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    /// Looks up relationship linkage.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipData> {
        self.relationships.get(name)
    }

    /// Overlays a partial record onto this one.
    ///
    /// Attributes, keys and relationships present in `partial` replace the
    /// current values; anything absent is left untouched.
    pub fn merge(&mut self, partial: &Record) {
        for (name, value) in &partial.keys {
            self.keys.insert(name.clone(), value.clone());
        }
        for (name, value) in &partial.attributes {
            self.attributes.insert(name.clone(), value.clone());
        }
        for (name, data) in &partial.relationships {
            self.relationships.insert(name.clone(), data.clone());
        }
    }
}
