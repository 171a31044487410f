//! Universal records
//!
//! A universal record is a field container addressed by UUID rather than by
//! position, so data can follow a block across moves and be shared between
//! locations. Each record remembers the last location it was seen at.

use crate::container::RecordContainer;
use crate::error::RecordResult;
use crate::pending::PendingWrites;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tiledata_common::{Location, RecordId};
use tracing::debug;

/// Reserved backend field holding the last known location (`world;x;y;z`)
pub const LAST_PRESENT_FIELD: &str = "__last_present";

/// Reserved backend field holding the creation time (unix seconds). Every
/// created record stores it, so a record exists in the backend even before
/// it has any data fields.
pub const CREATED_FIELD: &str = "__created";

/// UUID-addressed record held by the record store
pub struct UniversalRecord {
    id: RecordId,
    container: RecordContainer,
    last_present: RwLock<Option<Location>>,
    pending: Arc<PendingWrites>,
    /// Held while the record is populated from the backend
    load_lock: Mutex<()>,
}

impl UniversalRecord {
    pub(crate) fn new(id: RecordId, pending: Arc<PendingWrites>) -> Self {
        Self {
            id,
            container: RecordContainer::new(id.to_string()),
            last_present: RwLock::new(None),
            pending,
            load_lock: Mutex::new(()),
        }
    }

    pub(crate) const fn load_lock(&self) -> &Mutex<()> {
        &self.load_lock
    }

    /// Queue the creation marker for a brand-new record
    pub(crate) fn mark_created(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        self.pending.put(self.id, CREATED_FIELD, now.to_string());
    }

    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// Underlying field container (read accessors are loaded-gated)
    #[must_use]
    pub const fn container(&self) -> &RecordContainer {
        &self.container
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.container.is_loaded()
    }

    /// Shorthand for `container().get_data(key)`
    pub fn get_data(&self, key: &str) -> RecordResult<Option<String>> {
        self.container.get_data(key)
    }

    /// Set a field and queue it for the next flush
    pub fn set_data(&self, key: &str, value: impl Into<String>) -> RecordResult<()> {
        self.container.check_loaded()?;
        let value = value.into();
        self.container.set_field(key, value.clone(), true);
        self.pending.put(self.id, key, value);
        Ok(())
    }

    /// Remove a field and queue the removal for the next flush
    pub fn remove_data(&self, key: &str) -> RecordResult<Option<String>> {
        self.container.check_loaded()?;
        let previous = self.container.remove_field(key);
        if previous.is_some() {
            self.pending.delete(self.id, key);
        }
        Ok(previous)
    }

    /// Last location this record was seen at
    #[must_use]
    pub fn last_present(&self) -> Option<Location> {
        self.last_present.read().clone()
    }

    /// Unconditionally record where this record lives now
    pub fn set_last_present(&self, location: Location) {
        let encoded = location.to_string();
        *self.last_present.write() = Some(location);
        self.pending.put(self.id, LAST_PRESENT_FIELD, encoded);
    }

    /// Record a location only if none is known yet.
    ///
    /// Returns whether this call filled the slot. Safe to race: exactly one
    /// of several concurrent callers wins.
    pub fn fill_last_present(&self, location: &Location) -> bool {
        {
            let mut slot = self.last_present.write();
            if slot.is_some() {
                return false;
            }
            *slot = Some(location.clone());
        }
        debug!("Filled missing location of record {} with {}", self.id, location);
        self.pending.put(self.id, LAST_PRESENT_FIELD, location.to_string());
        true
    }

    /// Restore the location read from the backend without queueing a write
    pub(crate) fn restore_last_present(&self, location: Location) {
        let mut slot = self.last_present.write();
        if slot.is_none() {
            *slot = Some(location);
        }
    }
}

impl fmt::Debug for UniversalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniversalRecord")
            .field("id", &self.id)
            .field("container", &self.container)
            .field("last_present", &*self.last_present.read())
            .finish()
    }
}
