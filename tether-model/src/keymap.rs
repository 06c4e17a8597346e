use crate::{ModelError, ModelResult};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tether_types::{Record, RecordId};

#[derive(Debug, Default)]
struct KeyTable {
    by_value: HashMap<String, RecordId>,
    by_id: HashMap<RecordId, String>,
}

/// Bidirectional pairing of local record ids with key values (such as the
/// remote-assigned `remoteId`), scoped per record type and key name.
///
/// A pairing, once made, is never overwritten: a record maps to at most one
/// value per key and each value maps to at most one record.
#[derive(Debug, Default)]
pub struct KeyMap {
    tables: RwLock<HashMap<(String, String), KeyTable>>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local id paired with a key value.
    pub fn key_to_id(&self, record_type: &str, key: &str, value: &str) -> Option<RecordId> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(&(record_type.to_string(), key.to_string()))
            .and_then(|t| t.by_value.get(value).cloned())
    }

    /// Key value paired with a local id.
    pub fn id_to_key(&self, record_type: &str, key: &str, id: &RecordId) -> Option<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(&(record_type.to_string(), key.to_string()))
            .and_then(|t| t.by_id.get(id).cloned())
    }

    /// Whether any key of `record_type` is paired with `id`.
    pub fn has_id(&self, record_type: &str, id: &RecordId) -> bool {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .iter()
            .any(|((t, _), table)| t == record_type && table.by_id.contains_key(id))
    }

    /// First local id paired with any of the given key values.
    pub fn id_from_keys<'a>(
        &self,
        record_type: &str,
        keys: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Option<RecordId> {
        keys.into_iter()
            .find_map(|(key, value)| self.key_to_id(record_type, key, value))
    }

    /// Verifies that every key of `record` is either unpaired or already
    /// paired with this record.
    pub fn check_record(&self, record: &Record) -> ModelResult<()> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in &record.keys {
            if let Some(table) = tables.get(&(record.record_type.clone(), key.clone())) {
                Self::check_pair(table, record, key, value)?;
            }
        }
        Ok(())
    }

    /// Registers every key of `record`.
    ///
    /// All keys are checked before any is written, so a conflict leaves the
    /// map untouched.
    pub fn push_record(&self, record: &Record) -> ModelResult<()> {
        self.push_records([record])
    }

    /// Registers the keys of several records at once.
    ///
    /// The records are checked against the map and against each other
    /// before anything is written: two records claiming one key value, or
    /// one record claiming two, is a conflict and nothing is registered.
    pub fn push_records<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> ModelResult<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut batch: HashMap<(String, String), KeyTable> = HashMap::new();
        for record in records {
            for (key, value) in &record.keys {
                let slot = (record.record_type.clone(), key.clone());
                if let Some(table) = tables.get(&slot) {
                    Self::check_pair(table, record, key, value)?;
                }
                let pending = batch.entry(slot).or_default();
                Self::check_pair(pending, record, key, value)?;
                pending.by_value.insert(value.clone(), record.id.clone());
                pending.by_id.insert(record.id.clone(), value.clone());
            }
        }
        for (slot, pending) in batch {
            let table = tables.entry(slot).or_default();
            table.by_value.extend(pending.by_value);
            table.by_id.extend(pending.by_id);
        }
        Ok(())
    }

    fn check_pair(table: &KeyTable, record: &Record, key: &str, value: &str) -> ModelResult<()> {
        let value_taken = table.by_value.get(value).is_some_and(|id| *id != record.id);
        let id_taken = table.by_id.get(&record.id).is_some_and(|v| v != value);
        if value_taken || id_taken {
            return Err(ModelError::KeyConflict {
                record_type: record.record_type.clone(),
                key: key.to_string(),
                value: value.to_string(),
                id: record.id.clone(),
            });
        }
        Ok(())
    }

    /// Number of pairings across all types and keys.
    pub fn len(&self) -> usize {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.values().map(|t| t.by_id.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
