//! In-process record set and query evaluation.

use crate::error::{SyncError, SyncResult};
use crate::query::{QueryExpression, QueryResult, SortOrder, compare_values};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tether_model::{KeyMap, Schema};
use tether_types::{Operation, Record, RecordIdentity, RelationshipData, Transform};

/// Applies one operation to the current version of a record.
///
/// Returns the new version, or `None` when the record is removed.
pub(crate) fn merge_operation(current: Option<&Record>, op: &Operation) -> Option<Record> {
    match op {
        Operation::AddRecord(record) => {
            let mut next = record.clone();
            if let Some(current) = current {
                for (key, value) in &current.keys {
                    next.keys.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
            Some(next)
        }
        Operation::UpdateRecord(partial) => match current {
            Some(current) => {
                let mut next = current.clone();
                next.merge(partial);
                Some(next)
            }
            None => Some(partial.clone()),
        },
        Operation::RemoveRecord(_) => None,
    }
}

/// Records keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct RecordCache {
    records: BTreeMap<RecordIdentity, Record>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cache from trusted records, without validation.
    pub(crate) fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.identity(), r)).collect(),
        }
    }

    pub fn get(&self, identity: &RecordIdentity) -> Option<&Record> {
        self.records.get(identity)
    }

    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.records.contains_key(identity)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Applies every operation of `transform`, or none of them.
    ///
    /// Each operation is validated against the schema, and every
    /// relationship target must be in the cache, in the same transform, or
    /// known to the key map. The key pairings of the resulting records are
    /// checked against the key map and against each other. Changes are
    /// staged over the current records and only written once every check
    /// has passed. Removing a record also drops references to it from the
    /// remaining records.
    pub fn apply(&mut self, transform: &Transform, schema: &Schema, keys: &KeyMap) -> SyncResult<()> {
        // `None` marks a removal
        let mut staged: BTreeMap<RecordIdentity, Option<Record>> = BTreeMap::new();
        let incoming: HashSet<RecordIdentity> =
            transform.records().map(Record::identity).collect();

        for op in transform.operations() {
            let identity = op.identity();
            match op.record() {
                Some(record) => {
                    schema.validate_record(record)?;
                    for (name, data) in &record.relationships {
                        for target in data.identities() {
                            let present = match staged.get(target) {
                                Some(next) => next.is_some(),
                                None => self.records.contains_key(target),
                            };
                            let known = present
                                || incoming.contains(target)
                                || keys.has_id(&target.record_type, &target.id);
                            if !known {
                                return Err(SyncError::Validation(format!(
                                    "{identity}.{name} references unknown record {target}"
                                )));
                            }
                        }
                    }
                }
                None => schema.validate_identity(&identity)?,
            }

            let current = match staged.get(&identity) {
                Some(next) => next.as_ref(),
                None => self.records.get(&identity),
            };
            let next = merge_operation(current, op);
            staged.insert(identity, next);
        }

        keys.push_records(staged.values().flatten())?;

        let mut removed = Vec::new();
        for (identity, next) in staged {
            match next {
                Some(record) => {
                    self.records.insert(identity, record);
                }
                None => {
                    self.records.remove(&identity);
                    removed.push(identity);
                }
            }
        }
        for identity in &removed {
            unlink(&mut self.records, identity);
        }
        Ok(())
    }

    /// Evaluates a query against the current records.
    pub fn query(&self, expression: &QueryExpression) -> SyncResult<QueryResult> {
        match expression {
            QueryExpression::FindRecord { record } => self
                .records
                .get(record)
                .cloned()
                .map(|r| QueryResult::Single(Some(r)))
                .ok_or_else(|| SyncError::NotFound(record.to_string())),

            QueryExpression::FindRecords {
                record_type,
                filter,
                sort,
                page,
            } => {
                let mut matched: Vec<&Record> = self
                    .records
                    .values()
                    .filter(|r| record_type.as_deref().is_none_or(|t| r.record_type == t))
                    .filter(|r| filter.iter().all(|f| f.matches(r)))
                    .collect();

                if !sort.is_empty() {
                    matched.sort_by(|a, b| {
                        sort.iter().fold(Ordering::Equal, |acc, spec| {
                            acc.then_with(|| {
                                let left = a.attribute(&spec.attribute).unwrap_or(&serde_json::Value::Null);
                                let right = b.attribute(&spec.attribute).unwrap_or(&serde_json::Value::Null);
                                let ord = compare_values(left, right).unwrap_or(Ordering::Equal);
                                match spec.order {
                                    SortOrder::Asc => ord,
                                    SortOrder::Desc => ord.reverse(),
                                }
                            })
                        })
                    });
                }

                let (offset, limit) = page.map_or((0, None), |p| (p.offset, p.limit));
                let records = matched
                    .into_iter()
                    .skip(offset)
                    .take(limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect();
                Ok(QueryResult::Collection(records))
            }

            QueryExpression::FindRelatedRecord {
                record,
                relationship,
            } => {
                let owner = self
                    .records
                    .get(record)
                    .ok_or_else(|| SyncError::NotFound(record.to_string()))?;
                let related = match owner.relationship(relationship) {
                    Some(RelationshipData::HasOne(Some(target))) => self.records.get(target).cloned(),
                    _ => None,
                };
                Ok(QueryResult::Single(related))
            }

            QueryExpression::FindRelatedRecords {
                record,
                relationship,
            } => {
                let owner = self
                    .records
                    .get(record)
                    .ok_or_else(|| SyncError::NotFound(record.to_string()))?;
                let related = match owner.relationship(relationship) {
                    Some(RelationshipData::HasMany(targets)) => targets
                        .iter()
                        .filter_map(|t| self.records.get(t).cloned())
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(QueryResult::Collection(related))
            }
        }
    }
}

/// Drops every reference to `removed`.
fn unlink(records: &mut BTreeMap<RecordIdentity, Record>, removed: &RecordIdentity) {
    for record in records.values_mut() {
        for data in record.relationships.values_mut() {
            match data {
                RelationshipData::HasOne(target) => {
                    if target.as_ref() == Some(removed) {
                        *target = None;
                    }
                }
                RelationshipData::HasMany(targets) => targets.retain(|t| t != removed),
            }
        }
    }
}
