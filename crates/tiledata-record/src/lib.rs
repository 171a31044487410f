//! TileData Records - UUID-keyed universal record store
//!
//! This crate implements the centralized record layer that block storage can
//! redirect into:
//! - `RecordContainer`: concurrent field map gated by an explicit loaded state
//! - `UniversalRecord`: a container plus its id and last known location
//! - `RecordStore`: cache of records with load, batched flush and eviction
//! - `RecordBackend`: persistence contract (in-memory and redb implementations)

pub mod backend;
pub mod container;
pub mod error;
pub mod redb_backend;
pub mod store;
pub mod universal;

mod pending;

// Re-exports
pub use backend::{FieldOp, MemoryBackend, RecordBackend};
pub use container::{FieldsView, RecordContainer};
pub use error::{RecordError, RecordResult};
pub use redb_backend::RedbBackend;
pub use store::{RecordLookup, RecordStore, RecordStoreStats};
pub use universal::{CREATED_FIELD, LAST_PRESENT_FIELD, UniversalRecord};
