//! Persistent record backend backed by redb.
//!
//! All fields of all records live in one table keyed `<uuid>/<field>`. The
//! textual UUID has a fixed width, so the fields of one record form a
//! contiguous key range `<uuid>/ .. <uuid>0` ('0' sorts right after '/').

use crate::backend::{FieldOp, RecordBackend};
use crate::error::RecordResult;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeSet;
use std::path::Path;
use tiledata_common::RecordId;
use tracing::{debug, info, warn};

/// `<uuid>/<field>` -> value
const RECORD_FIELDS: TableDefinition<&str, &str> = TableDefinition::new("record_fields");

fn field_key(record: &RecordId, field: &str) -> String {
    format!("{record}/{field}")
}

fn record_range(record: &RecordId) -> (String, String) {
    (format!("{record}/"), format!("{record}0"))
}

/// Record backend persisted in a redb database file
pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> RecordResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create the table eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(RECORD_FIELDS)?;
        }
        write_txn.commit()?;

        info!("Opened record database at {:?}", path);
        Ok(Self { db })
    }
}

impl RecordBackend for RedbBackend {
    fn name(&self) -> &'static str {
        "redb"
    }

    fn load_fields(&self, record: &RecordId) -> RecordResult<Vec<(String, String)>> {
        let (start, end) = record_range(record);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORD_FIELDS)?;

        let mut result = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (key, value) = entry?;
            if let Some(field) = key.value().strip_prefix(start.as_str()) {
                result.push((field.to_string(), value.value().to_string()));
            }
        }
        Ok(result)
    }

    fn list_records(&self) -> RecordResult<Vec<RecordId>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORD_FIELDS)?;

        let mut ids = BTreeSet::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            let key = key.value();
            let prefix = key.split_once('/').map_or(key, |(id, _)| id);
            match prefix.parse::<RecordId>() {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(e) => warn!("Skipping malformed record key '{}': {}", key, e),
            }
        }
        Ok(ids.into_iter().collect())
    }

    fn apply_batch(&self, ops: &[FieldOp]) -> RecordResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(RECORD_FIELDS)?;
            for op in ops {
                match op {
                    FieldOp::Put {
                        record,
                        field,
                        value,
                    } => {
                        table.insert(field_key(record, field).as_str(), value.as_str())?;
                    }
                    FieldOp::Delete { record, field } => {
                        table.remove(field_key(record, field).as_str())?;
                    }
                }
            }
        }
        write_txn.commit()?;

        debug!("Applied {} field ops", ops.len());
        Ok(())
    }

    fn delete_record(&self, record: &RecordId) -> RecordResult<()> {
        let (start, end) = record_range(record);
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(RECORD_FIELDS)?;
            let keys = table
                .range(start.as_str()..end.as_str())?
                .map(|entry| entry.map(|(key, _)| key.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            for key in &keys {
                table.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}
