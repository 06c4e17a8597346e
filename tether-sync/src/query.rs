//! Query expressions, their canonical fingerprint, and results.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tether_model::{RelationshipKind, Schema};
use tether_types::{Record, RecordIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    #[default]
    Equal,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpecifier {
    pub attribute: String,
    #[serde(default)]
    pub op: FilterOp,
    pub value: Value,
}

impl FilterSpecifier {
    /// Whether `record` satisfies this filter. A missing attribute is `null`.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.attribute(&self.attribute).unwrap_or(&Value::Null);
        let ordering = compare_values(actual, &self.value);
        match self.op {
            FilterOp::Equal => actual == &self.value || ordering == Some(Ordering::Equal),
            FilterOp::Gt => ordering == Some(Ordering::Greater),
            FilterOp::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => ordering == Some(Ordering::Less),
            FilterOp::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpecifier {
    pub attribute: String,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageSpecifier {
    #[serde(default)]
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// What a query asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum QueryExpression {
    FindRecord {
        record: RecordIdentity,
    },
    /// All records of one type, or of every type when `record_type` is `None`.
    FindRecords {
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        record_type: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filter: Vec<FilterSpecifier>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sort: Vec<SortSpecifier>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<PageSpecifier>,
    },
    FindRelatedRecord {
        record: RecordIdentity,
        relationship: String,
    },
    FindRelatedRecords {
        record: RecordIdentity,
        relationship: String,
    },
}

impl QueryExpression {
    /// Record type the expression is about.
    pub fn record_type(&self) -> Option<&str> {
        match self {
            Self::FindRecord { record }
            | Self::FindRelatedRecord { record, .. }
            | Self::FindRelatedRecords { record, .. } => Some(&record.record_type),
            Self::FindRecords { record_type, .. } => record_type.as_deref(),
        }
    }

    /// Copy with order-insensitive terms in a fixed order.
    fn canonical(&self) -> Self {
        let mut expression = self.clone();
        if let Self::FindRecords { filter, .. } = &mut expression {
            filter.sort_by(|a, b| {
                a.attribute
                    .cmp(&b.attribute)
                    .then_with(|| op_rank(a.op).cmp(&op_rank(b.op)))
                    .then_with(|| a.value.to_string().cmp(&b.value.to_string()))
            });
        }
        expression
    }
}

fn op_rank(op: FilterOp) -> u8 {
    op as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Bypass cached results and fetch from upstream.
    #[serde(default)]
    pub reload: bool,
}

/// A query and its options.
///
/// ```
/// use serde_json::json;
/// use tether_sync::Query;
///
/// let query = Query::find_records("article")
///     .filter("slug", json!("hello"))
///     .sort_desc("createdAt")
///     .page(0, Some(10));
/// assert!(!query.options.reload);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub expression: QueryExpression,
    #[serde(default)]
    pub options: QueryOptions,
}

impl Query {
    pub fn new(expression: QueryExpression) -> Self {
        Self {
            expression,
            options: QueryOptions::default(),
        }
    }

    pub fn find_record(record: RecordIdentity) -> Self {
        Self::new(QueryExpression::FindRecord { record })
    }

    pub fn find_records(record_type: impl Into<String>) -> Self {
        Self::new(QueryExpression::FindRecords {
            record_type: Some(record_type.into()),
            filter: Vec::new(),
            sort: Vec::new(),
            page: None,
        })
    }

    /// Every record of every type.
    pub fn find_all_records() -> Self {
        Self::new(QueryExpression::FindRecords {
            record_type: None,
            filter: Vec::new(),
            sort: Vec::new(),
            page: None,
        })
    }

    pub fn find_related_record(record: RecordIdentity, relationship: impl Into<String>) -> Self {
        Self::new(QueryExpression::FindRelatedRecord {
            record,
            relationship: relationship.into(),
        })
    }

    pub fn find_related_records(record: RecordIdentity, relationship: impl Into<String>) -> Self {
        Self::new(QueryExpression::FindRelatedRecords {
            record,
            relationship: relationship.into(),
        })
    }

    /// Adds an equality filter. Ignored unless the query finds records.
    #[must_use]
    pub fn filter(self, attribute: impl Into<String>, value: Value) -> Self {
        self.filter_op(attribute, FilterOp::Equal, value)
    }

    #[must_use]
    pub fn filter_op(mut self, attribute: impl Into<String>, op: FilterOp, value: Value) -> Self {
        if let QueryExpression::FindRecords { filter, .. } = &mut self.expression {
            filter.push(FilterSpecifier {
                attribute: attribute.into(),
                op,
                value,
            });
        }
        self
    }

    #[must_use]
    pub fn sort(self, attribute: impl Into<String>) -> Self {
        self.sort_by(attribute, SortOrder::Asc)
    }

    #[must_use]
    pub fn sort_desc(self, attribute: impl Into<String>) -> Self {
        self.sort_by(attribute, SortOrder::Desc)
    }

    #[must_use]
    pub fn sort_by(mut self, attribute: impl Into<String>, order: SortOrder) -> Self {
        if let QueryExpression::FindRecords { sort, .. } = &mut self.expression {
            sort.push(SortSpecifier {
                attribute: attribute.into(),
                order,
            });
        }
        self
    }

    #[must_use]
    pub fn page(mut self, offset: usize, limit: Option<usize>) -> Self {
        if let QueryExpression::FindRecords { page, .. } = &mut self.expression {
            *page = Some(PageSpecifier { offset, limit });
        }
        self
    }

    #[must_use]
    pub fn reload(mut self) -> Self {
        self.options.reload = true;
        self
    }

    /// Canonical key of the query's shape.
    ///
    /// Filter terms are order-insensitive; sort terms are not, since they
    /// change the result. Options are not part of the shape.
    pub fn fingerprint(&self) -> String {
        let canonical = self.expression.canonical();
        serde_json::to_string(&canonical).unwrap_or_else(|_| format!("{canonical:?}"))
    }

    /// Checks the query's types and relationships against the schema.
    pub fn validate(&self, schema: &Schema) -> SyncResult<()> {
        match &self.expression {
            QueryExpression::FindRecord { record } => schema.validate_identity(record)?,
            QueryExpression::FindRecords { record_type, .. } => {
                if let Some(record_type) = record_type {
                    schema.model(record_type)?;
                }
            }
            QueryExpression::FindRelatedRecord {
                record,
                relationship,
            } => expect_kind(schema, record, relationship, RelationshipKind::HasOne)?,
            QueryExpression::FindRelatedRecords {
                record,
                relationship,
            } => expect_kind(schema, record, relationship, RelationshipKind::HasMany)?,
        }
        Ok(())
    }
}

fn expect_kind(
    schema: &Schema,
    record: &RecordIdentity,
    relationship: &str,
    kind: RelationshipKind,
) -> SyncResult<()> {
    let def = schema.relationship(&record.record_type, relationship)?;
    if def.kind != kind {
        return Err(SyncError::Validation(format!(
            "{}.{relationship} is {}, not {kind}",
            record.record_type, def.kind
        )));
    }
    Ok(())
}

/// Orders two JSON values: numbers numerically, strings lexically.
/// Values of different kinds are unordered.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Records answering a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Single(Option<Record>),
    Collection(Vec<Record>),
}

impl QueryResult {
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Self::Single(record) => record.iter().collect(),
            Self::Collection(records) => records.iter().collect(),
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Single(record) => record.into_iter().collect(),
            Self::Collection(records) => records,
        }
    }

    /// The single record, or the first record of a collection.
    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::Single(record) => record,
            Self::Collection(records) => records.into_iter().next(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(record) => usize::from(record.is_some()),
            Self::Collection(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
