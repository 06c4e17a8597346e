use crate::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tether_types::{Record, RecordIdentity, RelationshipData};

/// Declared type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Date,
    #[serde(alias = "dateTime")]
    Datetime,
    Object,
    Array,
    /// Any type the schema descriptor names that tether does not check.
    #[default]
    #[serde(other)]
    Any,
}

impl AttributeType {
    /// Whether `value` is acceptable for this type. `null` always is.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Any, _) => true,
            (Self::String | Self::Date | Self::Datetime, Value::String(_)) => true,
            (Self::Number, Value::Number(_)) => true,
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            (Self::Array, Value::Array(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// Whether an attribute may be sent to a remote on write.
///
/// Server-computed attributes (timestamps, counters) are `ReadOnly`: they are
/// accepted from remote responses but never serialized into requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldAccess {
    #[default]
    Writable,
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributeDefinition {
    #[serde(rename = "type", default)]
    pub attr_type: AttributeType,
    #[serde(default, skip_serializing_if = "is_writable")]
    pub access: FieldAccess,
}

fn is_writable(access: &FieldAccess) -> bool {
    *access == FieldAccess::Writable
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    HasOne,
    HasMany,
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HasOne => f.write_str("hasOne"),
            Self::HasMany => f.write_str("hasMany"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    /// Model name of the related records.
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
}

/// One record type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, Value>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDefinition>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDefinition>,
}

impl ModelDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, attr_type: AttributeType) -> Self {
        self.attributes.insert(
            name.into(),
            AttributeDefinition {
                attr_type,
                access: FieldAccess::Writable,
            },
        );
        self
    }

    #[must_use]
    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.keys.insert(name.into(), Value::Object(Default::default()));
        self
    }

    #[must_use]
    pub fn has_one(self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.relationship(name, RelationshipKind::HasOne, model, None)
    }

    #[must_use]
    pub fn has_many(self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.relationship(name, RelationshipKind::HasMany, model, None)
    }

    #[must_use]
    pub fn relationship(
        mut self,
        name: impl Into<String>,
        kind: RelationshipKind,
        model: impl Into<String>,
        inverse: Option<String>,
    ) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDefinition {
                kind,
                model: model.into(),
                inverse,
            },
        );
        self
    }

    #[must_use]
    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = Some(plural.into());
        self
    }
}

/// Immutable description of every record type a source may hold.
///
/// Deserializes from the descriptor served at `{host}/schema`:
///
/// ```json
/// {"models": {"article": {
///     "attributes": {"title": {"type": "string"}},
///     "relationships": {"author": {"type": "hasOne", "model": "profile", "inverse": "articles"}}
/// }}}
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default = "default_version")]
    pub version: u32,
    pub models: BTreeMap<String, ModelDefinition>,
}

fn default_version() -> u32 {
    1
}

impl Schema {
    /// Builds a schema from model definitions.
    pub fn new(models: impl IntoIterator<Item = (String, ModelDefinition)>) -> ModelResult<Self> {
        let schema = Self {
            version: default_version(),
            models: models.into_iter().collect(),
        };
        schema.check_references()?;
        Ok(schema)
    }

    /// Parses a schema descriptor.
    pub fn from_json(json: &str) -> ModelResult<Self> {
        let schema: Self = serde_json::from_str(json)?;
        schema.check_references()?;
        Ok(schema)
    }

    /// Parses a schema descriptor that has already been decoded.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        let schema: Self = serde_json::from_value(value)?;
        schema.check_references()?;
        Ok(schema)
    }

    /// Every relationship must point at a declared model.
    fn check_references(&self) -> ModelResult<()> {
        for (name, model) in &self.models {
            for (rel_name, rel) in &model.relationships {
                if !self.models.contains_key(&rel.model) {
                    return Err(ModelError::InvalidSchema(format!(
                        "{name}.{rel_name} references unknown model {}",
                        rel.model
                    )));
                }
            }
        }
        Ok(())
    }

    /// Marks the named attributes read-only in every model declaring them.
    #[must_use]
    pub fn with_read_only_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for attribute in attributes {
            for model in self.models.values_mut() {
                if let Some(def) = model.attributes.get_mut(attribute.as_ref()) {
                    def.access = FieldAccess::ReadOnly;
                }
            }
        }
        self
    }

    pub fn model(&self, record_type: &str) -> ModelResult<&ModelDefinition> {
        self.models
            .get(record_type)
            .ok_or_else(|| ModelError::UnknownModel(record_type.to_string()))
    }

    pub fn has_model(&self, record_type: &str) -> bool {
        self.models.contains_key(record_type)
    }

    pub fn relationship(
        &self,
        record_type: &str,
        relationship: &str,
    ) -> ModelResult<&RelationshipDefinition> {
        self.model(record_type)?
            .relationships
            .get(relationship)
            .ok_or_else(|| ModelError::UnknownRelationship {
                model: record_type.to_string(),
                relationship: relationship.to_string(),
            })
    }

    /// Whether `attribute` may be serialized into a remote write.
    ///
    /// Undeclared attributes are never writable.
    pub fn is_writable(&self, record_type: &str, attribute: &str) -> bool {
        self.models
            .get(record_type)
            .and_then(|m| m.attributes.get(attribute))
            .is_some_and(|a| a.access == FieldAccess::Writable)
    }

    /// Resource collection name for a model.
    pub fn pluralize(&self, record_type: &str) -> String {
        match self.models.get(record_type).and_then(|m| m.plural.as_deref()) {
            Some(plural) => plural.to_string(),
            None => format!("{record_type}s"),
        }
    }

    /// Model name for a resource collection name, if one matches.
    pub fn singularize(&self, plural: &str) -> Option<&str> {
        self.models
            .keys()
            .find(|name| self.pluralize(name) == plural)
            .map(String::as_str)
    }

    pub fn validate_identity(&self, identity: &RecordIdentity) -> ModelResult<()> {
        self.model(&identity.record_type).map(|_| ())
    }

    /// Checks a full or partial record against its model.
    ///
    /// Relationship targets are only checked for type; whether they exist is
    /// up to the store applying the record.
    pub fn validate_record(&self, record: &Record) -> ModelResult<()> {
        let model_name = record.record_type.as_str();
        let model = self.model(model_name)?;

        for (name, value) in &record.attributes {
            let def = model
                .attributes
                .get(name)
                .ok_or_else(|| ModelError::UnknownAttribute {
                    model: model_name.to_string(),
                    attribute: name.clone(),
                })?;
            if !def.attr_type.accepts(value) {
                return Err(ModelError::AttributeType {
                    model: model_name.to_string(),
                    attribute: name.clone(),
                    expected: def.attr_type,
                });
            }
        }

        for (name, data) in &record.relationships {
            let def = self.relationship(model_name, name)?;
            let shape_ok = matches!(
                (def.kind, data),
                (RelationshipKind::HasOne, RelationshipData::HasOne(_))
                    | (RelationshipKind::HasMany, RelationshipData::HasMany(_))
            );
            if !shape_ok {
                return Err(ModelError::RelationshipShape {
                    model: model_name.to_string(),
                    relationship: name.clone(),
                    expected: def.kind,
                });
            }
            if let Some(other) = data
                .identities()
                .into_iter()
                .find(|identity| identity.record_type != def.model)
            {
                return Err(ModelError::RelationshipModel {
                    model: model_name.to_string(),
                    relationship: name.clone(),
                    expected: def.model.clone(),
                    found: other.record_type.clone(),
                });
            }
        }

        Ok(())
    }
}
