//! JSON:API documents to and from records.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tether_model::{KeyMap, Schema};
use tether_types::{Record, RecordId, RecordIdentity, RelationshipData};
use tracing::debug;

/// A JSON:API resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub relationships: Map<String, Value>,
}

/// A JSON:API top-level document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub included: Vec<Resource>,
}

/// Maps records to JSON:API resources and back.
///
/// The resource `type` is the pluralized model name and the resource `id` is
/// the record key named by `resource_key`, paired with the local id through
/// the shared [`KeyMap`].
pub struct JsonApiSerializer {
    schema: Arc<Schema>,
    keys: Arc<KeyMap>,
    resource_key: String,
}

impl JsonApiSerializer {
    pub fn new(schema: Arc<Schema>, keys: Arc<KeyMap>, resource_key: impl Into<String>) -> Self {
        Self {
            schema,
            keys,
            resource_key: resource_key.into(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn resource_key(&self) -> &str {
        &self.resource_key
    }

    pub fn resource_type(&self, record_type: &str) -> String {
        self.schema.pluralize(record_type)
    }

    /// Remote id of a local record, if it has been paired.
    pub fn resource_id(&self, identity: &RecordIdentity) -> Option<String> {
        self.keys
            .id_to_key(&identity.record_type, &self.resource_key, &identity.id)
    }

    /// Resource for a create or update request.
    ///
    /// Read-only attributes are left out, as is the id of a record that has
    /// not been paired yet. Related records without a remote id are omitted.
    pub fn serialize_for_write(&self, record: &Record) -> Resource {
        let attributes = record
            .attributes
            .iter()
            .filter(|(name, _)| self.schema.is_writable(&record.record_type, name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut relationships = Map::new();
        for (name, data) in &record.relationships {
            let linkage = match data {
                RelationshipData::HasOne(None) => Some(Value::Null),
                RelationshipData::HasOne(Some(target)) => self.identifier(target),
                RelationshipData::HasMany(targets) => Some(Value::Array(
                    targets.iter().filter_map(|t| self.identifier(t)).collect(),
                )),
            };
            if let Some(linkage) = linkage {
                relationships.insert(name.clone(), json!({ "data": linkage }));
            }
        }

        Resource {
            resource_type: self.resource_type(&record.record_type),
            id: self.resource_id(&record.identity()).map(Value::String),
            attributes,
            relationships,
        }
    }

    /// Request body `{"data": resource}`.
    pub fn serialize_document(&self, record: &Record) -> SyncResult<Value> {
        Ok(json!({ "data": serde_json::to_value(self.serialize_for_write(record))? }))
    }

    fn identifier(&self, identity: &RecordIdentity) -> Option<Value> {
        let id = self.resource_id(identity)?;
        Some(json!({ "type": self.resource_type(&identity.record_type), "id": id }))
    }

    /// Record for a resource returned by the server.
    ///
    /// The local id is looked up in the key map; failing that `local_id` is
    /// used, or a fresh id is minted, and the pairing is registered.
    /// Undeclared attributes and relationships are dropped.
    pub fn deserialize_resource(
        &self,
        resource: &Resource,
        local_id: Option<RecordId>,
    ) -> SyncResult<Record> {
        let record_type = self.model_name(&resource.resource_type)?;
        let remote_id = resource
            .id
            .as_ref()
            .and_then(id_string)
            .ok_or_else(|| SyncError::Validation(format!("{record_type} resource without id")))?;
        let identity = self.local_identity(&record_type, &remote_id, local_id)?;

        let model = self.schema.model(&record_type)?;
        let mut record = Record::new(record_type.clone(), identity.id)
            .with_key(self.resource_key.clone(), remote_id);

        for (name, value) in &resource.attributes {
            if model.attributes.contains_key(name) {
                record.attributes.insert(name.clone(), value.clone());
            } else {
                debug!(model = %record_type, attribute = %name, "dropping undeclared attribute");
            }
        }

        for (name, relationship) in &resource.relationships {
            if !model.relationships.contains_key(name) {
                continue;
            }
            let data = match relationship.get("data") {
                None => continue,
                Some(Value::Null) => RelationshipData::HasOne(None),
                Some(Value::Array(items)) => RelationshipData::HasMany(
                    items
                        .iter()
                        .map(|item| self.linkage(item))
                        .collect::<SyncResult<_>>()?,
                ),
                Some(item) => RelationshipData::HasOne(Some(self.linkage(item)?)),
            };
            record.relationships.insert(name.clone(), data);
        }

        Ok(record)
    }

    /// Every record in a response document: primary data first, then
    /// included resources.
    pub fn deserialize_document(&self, document: &Document) -> SyncResult<Vec<Record>> {
        let mut records = Vec::new();
        match &document.data {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    let resource: Resource = serde_json::from_value(item.clone())?;
                    records.push(self.deserialize_resource(&resource, None)?);
                }
            }
            item => {
                let resource: Resource = serde_json::from_value(item.clone())?;
                records.push(self.deserialize_resource(&resource, None)?);
            }
        }
        for resource in &document.included {
            records.push(self.deserialize_resource(resource, None)?);
        }
        Ok(records)
    }

    fn linkage(&self, item: &Value) -> SyncResult<RecordIdentity> {
        let resource_type = item
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Validation("resource identifier without type".into()))?;
        let remote_id = item
            .get("id")
            .and_then(id_string)
            .ok_or_else(|| SyncError::Validation("resource identifier without id".into()))?;
        let record_type = self.model_name(resource_type)?;
        self.local_identity(&record_type, &remote_id, None)
    }

    fn model_name(&self, resource_type: &str) -> SyncResult<String> {
        if let Some(name) = self.schema.singularize(resource_type) {
            return Ok(name.to_string());
        }
        if self.schema.has_model(resource_type) {
            return Ok(resource_type.to_string());
        }
        Err(SyncError::Validation(format!(
            "unknown resource type {resource_type}"
        )))
    }

    fn local_identity(
        &self,
        record_type: &str,
        remote_id: &str,
        local_id: Option<RecordId>,
    ) -> SyncResult<RecordIdentity> {
        if let Some(id) = self.keys.key_to_id(record_type, &self.resource_key, remote_id) {
            return Ok(RecordIdentity::new(record_type, id));
        }
        let id = local_id.unwrap_or_default();
        let pairing = Record::new(record_type, id.clone()).with_key(self.resource_key.clone(), remote_id);
        self.keys.push_record(&pairing)?;
        Ok(RecordIdentity::new(record_type, id))
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Query parameters as JSON:API expects them, e.g. `filter[slug]=hello`.
pub(crate) fn filter_param(attribute: &str, value: &Value) -> (String, String) {
    let value = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    (format!("filter[{attribute}]"), value)
}
