//! Loaded-gated field container
//!
//! A `RecordContainer` is created empty and unloaded, populated field by field
//! while its backing data is fetched, then flipped to loaded exactly once.
//! Read accessors refuse to run before that point so a caller racing the load
//! cannot mistake "not loaded yet" for "genuinely empty".
//!
//! The field map is a sharded concurrent map: writers touching different
//! fields of the same record rarely contend, and there is no container-wide
//! lock.

use crate::error::{RecordError, RecordResult};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Concurrent string field store for one logical record
pub struct RecordContainer {
    key: String,
    data: DashMap<String, String>,
    loaded: AtomicBool,
}

impl RecordContainer {
    /// Create an empty, unloaded container
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data: DashMap::new(),
            loaded: AtomicBool::new(false),
        }
    }

    /// Identity assigned at construction
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether population has completed
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Flip the container to loaded. There is no way back.
    ///
    /// The release store pairs with the acquire load in `is_loaded`, so every
    /// field written before this call is visible to a reader that observes
    /// the container as loaded.
    pub(crate) fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::Release);
    }

    /// Write a field. With `replace == false` the write only lands if the
    /// field is currently absent (first writer wins).
    pub(crate) fn set_field(&self, key: impl Into<String>, value: impl Into<String>, replace: bool) {
        if replace {
            self.data.insert(key.into(), value.into());
        } else {
            self.data.entry(key.into()).or_insert_with(|| value.into());
        }
    }

    /// Remove a field, returning its previous value
    pub(crate) fn remove_field(&self, key: &str) -> Option<String> {
        self.data.remove(key).map(|(_, value)| value)
    }

    pub(crate) fn check_loaded(&self) -> RecordResult<()> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(RecordError::NotLoaded {
                key: self.key.clone(),
            })
        }
    }

    /// Read-only view of all fields
    pub fn all_data(&self) -> RecordResult<FieldsView<'_>> {
        self.check_loaded()?;
        Ok(FieldsView { data: &self.data })
    }

    /// Names of all fields currently present
    pub fn data_keys(&self) -> RecordResult<HashSet<String>> {
        self.check_loaded()?;
        Ok(self.data.iter().map(|e| e.key().clone()).collect())
    }

    /// Value of a single field
    pub fn get_data(&self, key: &str) -> RecordResult<Option<String>> {
        self.check_loaded()?;
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }
}

impl fmt::Debug for RecordContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordContainer")
            .field("key", &self.key)
            .field("fields", &self.data.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Read-only, weakly consistent view over a container's fields.
///
/// Concurrent writers may or may not be reflected while the view is in use.
/// Iteration copies entries out shard by shard and never blocks writers for
/// longer than one shard read.
#[derive(Debug)]
pub struct FieldsView<'a> {
    data: &'a DashMap<String, String>,
}

impl FieldsView<'_> {
    /// Value of a field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|v| v.value().clone())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Owned copies of all entries
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        self.data
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Owned copy of all entries as a map
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_unloaded_accessors_fail() {
        let container = RecordContainer::new("c");
        assert!(!container.is_loaded());

        assert!(container.all_data().unwrap_err().is_not_loaded());
        assert!(container.data_keys().unwrap_err().is_not_loaded());
        assert!(container.get_data("x").unwrap_err().is_not_loaded());
    }

    #[test]
    fn test_loaded_empty_container() {
        let container = RecordContainer::new("c");
        container.mark_loaded();

        assert!(container.is_loaded());
        assert_eq!(container.get_data("x").unwrap(), None);
        assert!(container.all_data().unwrap().is_empty());
        assert!(container.data_keys().unwrap().is_empty());
    }

    #[test]
    fn test_fields_written_before_load_are_visible() {
        let container = RecordContainer::new("c");
        container.set_field("power", "42", false);
        container.mark_loaded();

        assert_eq!(container.get_data("power").unwrap().as_deref(), Some("42"));
        assert_eq!(container.all_data().unwrap().get("power").as_deref(), Some("42"));
    }

    #[test]
    fn test_set_field_first_writer_wins() {
        let container = RecordContainer::new("c");
        container.mark_loaded();

        container.set_field("k", "v1", false);
        container.set_field("k", "v2", false);
        assert_eq!(container.get_data("k").unwrap().as_deref(), Some("v1"));

        container.set_field("k", "v2", true);
        assert_eq!(container.get_data("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_remove_field() {
        let container = RecordContainer::new("c");
        container.set_field("k", "v", true);

        assert_eq!(container.remove_field("k").as_deref(), Some("v"));
        assert_eq!(container.remove_field("k"), None);

        container.mark_loaded();
        assert!(!container.data_keys().unwrap().contains("k"));
    }

    #[test]
    fn test_key_is_stable() {
        let container = RecordContainer::new("0b9c5a3e-6f3e-4b4e-9d5c-2f1d0c7a8e11");
        container.set_field("a", "b", true);
        assert_eq!(container.key(), "0b9c5a3e-6f3e-4b4e-9d5c-2f1d0c7a8e11");
    }

    #[test]
    fn test_concurrent_distinct_keys_no_lost_writes() {
        const THREADS: usize = 16;
        const PER_THREAD: usize = 200;

        let container = Arc::new(RecordContainer::new("c"));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let container = Arc::clone(&container);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_THREAD {
                        container.set_field(format!("t{t}-{i}"), i.to_string(), false);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        container.mark_loaded();

        let data = container.all_data().unwrap().to_map();
        assert_eq!(data.len(), THREADS * PER_THREAD);
        assert_eq!(data.get("t3-17").map(String::as_str), Some("17"));
    }

    #[test]
    fn test_concurrent_same_key_first_writer_wins() {
        const THREADS: usize = 8;

        let container = Arc::new(RecordContainer::new("c"));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let container = Arc::clone(&container);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    container.set_field("shared", t.to_string(), false);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        container.mark_loaded();

        // Exactly one writer landed and nobody overwrote it
        let value = container.get_data("shared").unwrap().unwrap();
        let winner: usize = value.parse().unwrap();
        assert!(winner < THREADS);
        assert_eq!(container.data_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_view_tolerates_concurrent_writers() {
        let container = Arc::new(RecordContainer::new("c"));
        container.mark_loaded();
        for i in 0..100 {
            container.set_field(format!("k{i}"), "v", true);
        }

        let writer = {
            let container = Arc::clone(&container);
            thread::spawn(move || {
                for i in 100..1000 {
                    container.set_field(format!("k{i}"), "v", true);
                }
            })
        };

        let view = container.all_data().unwrap();
        for _ in 0..10 {
            let entries = view.entries();
            assert!(entries.len() >= 100);
            assert!(entries.iter().all(|(_, v)| v == "v"));
        }

        writer.join().unwrap();
        assert_eq!(view.len(), 1000);
    }
}
