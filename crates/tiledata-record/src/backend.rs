//! Record persistence backends
//!
//! The record store never talks to a database directly; it goes through the
//! `RecordBackend` contract, which only needs to load the fields of one
//! record and apply batches of field changes.

use crate::error::RecordResult;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tiledata_common::RecordId;

/// A single field change destined for the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldOp {
    Put {
        record: RecordId,
        field: String,
        value: String,
    },
    Delete {
        record: RecordId,
        field: String,
    },
}

impl FieldOp {
    pub(crate) fn from_change(record: RecordId, field: String, value: Option<String>) -> Self {
        match value {
            Some(value) => Self::Put {
                record,
                field,
                value,
            },
            None => Self::Delete { record, field },
        }
    }

    pub(crate) fn into_change(self) -> (RecordId, String, Option<String>) {
        match self {
            Self::Put {
                record,
                field,
                value,
            } => (record, field, Some(value)),
            Self::Delete { record, field } => (record, field, None),
        }
    }

    /// Record the change belongs to
    #[must_use]
    pub const fn record(&self) -> RecordId {
        match self {
            Self::Put { record, .. } | Self::Delete { record, .. } => *record,
        }
    }

    /// Field the change targets
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Put { field, .. } | Self::Delete { field, .. } => field,
        }
    }
}

/// Persistence contract for universal records
pub trait RecordBackend: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &'static str;

    /// All stored fields of a record. Unknown records have no fields.
    fn load_fields(&self, record: &RecordId) -> RecordResult<Vec<(String, String)>>;

    /// Ids of every record with at least one stored field
    fn list_records(&self) -> RecordResult<Vec<RecordId>>;

    /// Apply a batch of changes. Either all of them land or none do.
    fn apply_batch(&self, ops: &[FieldOp]) -> RecordResult<()>;

    /// Remove every field of a record
    fn delete_record(&self, record: &RecordId) -> RecordResult<()>;
}

/// Volatile backend, used by tests and tools that do not need durability
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<BTreeMap<RecordId, HashMap<String, String>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records with stored fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl RecordBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load_fields(&self, record: &RecordId) -> RecordResult<Vec<(String, String)>> {
        Ok(self
            .records
            .read()
            .get(record)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_records(&self) -> RecordResult<Vec<RecordId>> {
        Ok(self.records.read().keys().copied().collect())
    }

    fn apply_batch(&self, ops: &[FieldOp]) -> RecordResult<()> {
        let mut records = self.records.write();
        for op in ops {
            match op {
                FieldOp::Put {
                    record,
                    field,
                    value,
                } => {
                    records
                        .entry(*record)
                        .or_default()
                        .insert(field.clone(), value.clone());
                }
                FieldOp::Delete { record, field } => {
                    if let Some(fields) = records.get_mut(record) {
                        fields.remove(field);
                        if fields.is_empty() {
                            records.remove(record);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn delete_record(&self, record: &RecordId) -> RecordResult<()> {
        self.records.write().remove(record);
        Ok(())
    }
}
