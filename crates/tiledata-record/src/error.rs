//! Error type for record operations

use tiledata_common::RecordId;

/// Error type for record store operations
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Read accessor used before the record finished loading
    #[error("unable to access unloaded data of record {key}")]
    NotLoaded { key: String },
    #[error("record not found: {0}")]
    NotFound(RecordId),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Common(#[from] tiledata_common::Error),
}

impl From<redb::TransactionError> for RecordError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl RecordError {
    /// Whether this is the read-before-load precondition failure
    #[must_use]
    pub const fn is_not_loaded(&self) -> bool {
        matches!(self, Self::NotLoaded { .. })
    }
}

pub type RecordResult<T> = Result<T, RecordError>;
