//! Universal record store
//!
//! Owns every `UniversalRecord` known to the process, keyed by `RecordId`.
//! Records enter the cache either freshly created (loaded immediately, there
//! is nothing to fetch) or through a load from the backend, which populates
//! the container first-writer-wins and then flips it to loaded.
//!
//! Field changes made on records are queued and written to the backend in
//! batches, either on an explicit `flush` or from a background thread.

use crate::backend::RecordBackend;
use crate::error::{RecordError, RecordResult};
use crate::pending::PendingWrites;
use crate::redb_backend::RedbBackend;
use crate::universal::{CREATED_FIELD, LAST_PRESENT_FIELD, UniversalRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tiledata_common::RecordId;
use tiledata_common::config::RecordStoreConfig;
use tracing::{debug, error, info, warn};

/// How often the background thread checks the pending queue
const FLUSH_TICK: Duration = Duration::from_millis(50);

/// Cache lookup used by consumers that must never trigger a load
pub trait RecordLookup: Send + Sync {
    /// The cached record for `id`, if any. Never blocks on I/O.
    fn cached(&self, id: &RecordId) -> Option<Arc<UniversalRecord>>;
}

#[derive(Debug, Default)]
struct FlushStats {
    flushes: AtomicU64,
    flushed_ops: AtomicU64,
    failed_flushes: AtomicU64,
}

/// Cache of universal records over a persistence backend
pub struct RecordStore {
    records: DashMap<RecordId, Arc<UniversalRecord>>,
    backend: Arc<dyn RecordBackend>,
    pending: Arc<PendingWrites>,
    config: RecordStoreConfig,
    stats: Arc<FlushStats>,
    /// Serializes flushes so a requeued batch cannot overtake a newer one
    flush_lock: Arc<Mutex<()>>,
    /// Shutdown flag for background thread
    shutdown: Arc<AtomicBool>,
    /// Background flush handle
    flush_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl RecordStore {
    /// Create a store over an existing backend
    pub fn new(backend: Arc<dyn RecordBackend>, config: RecordStoreConfig) -> Self {
        let store = Self {
            records: DashMap::new(),
            backend,
            pending: Arc::new(PendingWrites::default()),
            config,
            stats: Arc::new(FlushStats::default()),
            flush_lock: Arc::new(Mutex::new(())),
            shutdown: Arc::new(AtomicBool::new(false)),
            flush_handle: Mutex::new(None),
        };

        if store.config.background_flush {
            store.start_background_flush();
        }

        info!("Record store ready (backend: {})", store.backend.name());
        store
    }

    /// Open a store backed by the redb database at `config.db_path`
    pub fn open(config: RecordStoreConfig) -> RecordResult<Self> {
        let backend = RedbBackend::open(&config.db_path)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Cached record, without loading
    #[must_use]
    pub fn cached(&self, id: &RecordId) -> Option<Arc<UniversalRecord>> {
        self.records.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Create a brand-new record. It has no backing data, so it is loaded
    /// from the start. The next flush persists its creation marker.
    pub fn create_record(&self) -> Arc<UniversalRecord> {
        let id = RecordId::new();
        let record = Arc::new(UniversalRecord::new(id, Arc::clone(&self.pending)));
        record.container().mark_loaded();
        record.mark_created();
        self.records.insert(id, Arc::clone(&record));
        debug!("Created record {}", id);
        record
    }

    fn get_or_insert(&self, id: RecordId) -> Arc<UniversalRecord> {
        Arc::clone(
            self.records
                .entry(id)
                .or_insert_with(|| Arc::new(UniversalRecord::new(id, Arc::clone(&self.pending))))
                .value(),
        )
    }

    /// Load a record from the backend, or return it if already loaded
    pub fn load_record(&self, id: RecordId) -> RecordResult<Arc<UniversalRecord>> {
        let record = self.get_or_insert(id);
        populate(self.backend.as_ref(), &record)?;
        Ok(record)
    }

    /// Load a record that must already exist, cached or stored.
    ///
    /// Unlike `load_record`, an id the backend has never seen is an error
    /// instead of a fresh empty record.
    pub fn load_existing_record(&self, id: RecordId) -> RecordResult<Arc<UniversalRecord>> {
        if let Some(record) = self.cached(&id) {
            populate(self.backend.as_ref(), &record)?;
            return Ok(record);
        }

        let fields = self.backend.load_fields(&id)?;
        if fields.is_empty() {
            return Err(RecordError::NotFound(id));
        }

        let record = self.get_or_insert(id);
        {
            let _guard = record.load_lock().lock();
            if !record.is_loaded() {
                apply_fields(&record, fields);
            }
        }
        Ok(record)
    }

    /// Register the record and populate it on a worker thread.
    ///
    /// The returned record is usually still unloaded; callers must wait for
    /// `is_loaded()` before using its read accessors.
    pub fn load_record_in_background(&self, id: RecordId) -> Arc<UniversalRecord> {
        let record = self.get_or_insert(id);
        if record.is_loaded() {
            return record;
        }

        let backend = Arc::clone(&self.backend);
        let target = Arc::clone(&record);
        thread::spawn(move || {
            if let Err(e) = populate(backend.as_ref(), &target) {
                error!("Background load of record {} failed: {}", target.id(), e);
            }
        });
        record
    }

    /// Write every pending change to the backend in one batch.
    ///
    /// Returns the number of changes written. On failure the batch is put
    /// back in the queue and the error returned.
    pub fn flush(&self) -> RecordResult<usize> {
        let _guard = self.flush_lock.lock();
        flush_pending(&self.pending, self.backend.as_ref(), &self.stats)
    }

    /// Flush a record's pending changes and drop it from the cache.
    ///
    /// Returns whether the record was cached. Nothing is evicted if the
    /// flush fails.
    pub fn evict(&self, id: &RecordId) -> RecordResult<bool> {
        {
            let _guard = self.flush_lock.lock();
            let ops = self.pending.drain_record(*id);
            if !ops.is_empty() {
                if let Err(e) = self.backend.apply_batch(&ops) {
                    self.stats.failed_flushes.fetch_add(1, Ordering::Relaxed);
                    self.pending.requeue(ops);
                    return Err(e);
                }
                self.stats.flushes.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .flushed_ops
                    .fetch_add(ops.len() as u64, Ordering::Relaxed);
            }
        }

        let evicted = self.records.remove(id).is_some();
        if evicted {
            debug!("Evicted record {}", id);
        }
        Ok(evicted)
    }

    /// Remove a record everywhere: cache, pending queue and backend
    pub fn delete_record(&self, id: &RecordId) -> RecordResult<()> {
        let _guard = self.flush_lock.lock();
        self.records.remove(id);
        self.pending.discard_record(*id);
        self.backend.delete_record(id)?;
        info!("Deleted record {}", id);
        Ok(())
    }

    /// Ids of all records, stored or cached
    pub fn list_records(&self) -> RecordResult<Vec<RecordId>> {
        let mut ids: BTreeSet<RecordId> = self.backend.list_records()?.into_iter().collect();
        ids.extend(self.records.iter().map(|r| *r.key()));
        Ok(ids.into_iter().collect())
    }

    /// Number of cached records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of changes waiting for a flush
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> RecordStoreStats {
        RecordStoreStats {
            cached_records: self.records.len(),
            loaded_records: self.records.iter().filter(|r| r.is_loaded()).count(),
            pending_writes: self.pending.len(),
            flushes: self.stats.flushes.load(Ordering::Relaxed),
            flushed_ops: self.stats.flushed_ops.load(Ordering::Relaxed),
            failed_flushes: self.stats.failed_flushes.load(Ordering::Relaxed),
        }
    }

    /// Start background flush thread
    fn start_background_flush(&self) {
        let pending = Arc::clone(&self.pending);
        let backend = Arc::clone(&self.backend);
        let stats = Arc::clone(&self.stats);
        let flush_lock = Arc::clone(&self.flush_lock);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = tick_interval(&self.config);
        let threshold = self.config.flush_threshold;

        let handle = thread::spawn(move || {
            info!("Background flush thread started");
            let mut last_flush = Instant::now();

            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(FLUSH_TICK.min(interval));

                if shutdown.load(Ordering::Relaxed) {
                    break;
                }

                if pending.is_empty()
                    || (last_flush.elapsed() < interval && pending.len() < threshold)
                {
                    continue;
                }

                let _guard = flush_lock.lock();
                match flush_pending(&pending, backend.as_ref(), &stats) {
                    Ok(count) => debug!("Background flush wrote {} changes", count),
                    Err(e) => error!("Background flush failed: {}", e),
                }
                last_flush = Instant::now();
            }

            info!("Background flush thread stopped");
        });

        *self.flush_handle.lock() = Some(handle);
    }

    /// Stop background flushing and write out whatever is still pending
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.flush_handle.lock().take() {
            let _ = handle.join();
        }

        // Final flush
        if let Err(e) = self.flush() {
            error!(
                "Failed to flush {} pending changes on shutdown: {}",
                self.pending.len(),
                e
            );
        }
    }
}

impl RecordLookup for RecordStore {
    fn cached(&self, id: &RecordId) -> Option<Arc<UniversalRecord>> {
        Self::cached(self, id)
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Record store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordStoreStats {
    /// Number of cached records
    pub cached_records: usize,
    /// Number of cached records that finished loading
    pub loaded_records: usize,
    /// Changes waiting for a flush
    pub pending_writes: usize,
    /// Successful flush batches
    pub flushes: u64,
    /// Changes written by successful flushes
    pub flushed_ops: u64,
    /// Flush batches rejected by the backend
    pub failed_flushes: u64,
}

/// Background flush interval, never shorter than one tick
fn tick_interval(config: &RecordStoreConfig) -> Duration {
    config.flush_interval().max(FLUSH_TICK)
}

/// Fill a record from the backend and mark it loaded.
///
/// Runs at most once per record: concurrent callers wait on the record's
/// load lock and return without touching a record that is already loaded.
fn populate(backend: &dyn RecordBackend, record: &UniversalRecord) -> RecordResult<()> {
    if record.is_loaded() {
        return Ok(());
    }

    let _guard = record.load_lock().lock();
    if record.is_loaded() {
        return Ok(());
    }

    let fields = backend.load_fields(&record.id())?;
    apply_fields(record, fields);
    Ok(())
}

fn apply_fields(record: &UniversalRecord, fields: Vec<(String, String)>) {
    let count = fields.len();

    for (field, value) in fields {
        if field == LAST_PRESENT_FIELD {
            match value.parse() {
                Ok(location) => record.restore_last_present(location),
                Err(e) => warn!("Ignoring stored location of record {}: {}", record.id(), e),
            }
        } else if field != CREATED_FIELD {
            record.container().set_field(field, value, false);
        }
    }

    record.container().mark_loaded();
    debug!("Loaded record {} ({} fields)", record.id(), count);
}

fn flush_pending(
    pending: &PendingWrites,
    backend: &dyn RecordBackend,
    stats: &FlushStats,
) -> RecordResult<usize> {
    let ops = pending.drain();
    if ops.is_empty() {
        return Ok(0);
    }

    let count = ops.len();
    if let Err(e) = backend.apply_batch(&ops) {
        stats.failed_flushes.fetch_add(1, Ordering::Relaxed);
        pending.requeue(ops);
        return Err(e);
    }

    stats.flushes.fetch_add(1, Ordering::Relaxed);
    stats.flushed_ops.fetch_add(count as u64, Ordering::Relaxed);
    debug!("Flushed {} field changes", count);
    Ok(count)
}
