//! Block data service
//!
//! Stores strings inside the persistent data container of tile entity
//! blocks. Writes are best-effort: the host's native storage can fail for
//! reasons outside our control (outdated or incompatible server software),
//! and losing one metadata write is preferable to unwinding through game
//! logic. Failures are logged with the host's identification and reported
//! through `WriteOutcome`.
//!
//! A block can also point at a universal record by storing the record's
//! UUID under a reserved key instead of inline data.

use crate::world::{Block, BlockState, PersistentDataContainer};
use std::sync::Arc;
use tiledata_common::config::BlockDataConfig;
use tiledata_common::{HostInfo, Material, NamespacedKey, RecordId, Result, TILE_ENTITIES};
use tiledata_record::RecordLookup;
use tracing::{debug, error};

/// Result of a best-effort block write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Value committed to the block
    Stored,
    /// The block's state carries no data container; nothing was written
    Unsupported,
    /// Native storage failed; the failure was logged and the write dropped
    Failed,
}

impl WriteOutcome {
    #[must_use]
    pub const fn is_stored(self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Reads and writes string data attached to blocks
pub struct BlockDataService {
    data_key: NamespacedKey,
    universal_key: NamespacedKey,
    host: HostInfo,
    records: Arc<dyn RecordLookup>,
}

impl BlockDataService {
    /// Create a service owning the configured data and universal keys
    pub fn new(
        config: &BlockDataConfig,
        host: HostInfo,
        records: Arc<dyn RecordLookup>,
    ) -> Result<Self> {
        Ok(Self {
            data_key: NamespacedKey::new(&config.namespace, &config.data_key)?,
            universal_key: NamespacedKey::new(&config.namespace, &config.universal_key)?,
            host,
            records,
        })
    }

    /// Key of the general per-block payload
    #[must_use]
    pub const fn key(&self) -> &NamespacedKey {
        &self.data_key
    }

    /// Key holding a block's universal record UUID
    #[must_use]
    pub const fn universal_key(&self) -> &NamespacedKey {
        &self.universal_key
    }

    /// Store a value under the service key
    pub fn set_block_data<B: Block>(&self, block: &B, value: &str) -> WriteOutcome {
        self.set_block_data_with_key(block, &self.data_key, value)
    }

    /// Point a block at a universal record
    pub fn set_universal_data_uuid<B: Block>(&self, block: &B, id: RecordId) -> WriteOutcome {
        self.set_block_data_with_key(block, &self.universal_key, &id.to_string())
    }

    /// Store a value under an explicit key
    pub fn set_block_data_with_key<B: Block>(
        &self,
        block: &B,
        key: &NamespacedKey,
        value: &str,
    ) -> WriteOutcome {
        // Always the current state: an optimized snapshot can be stale
        // right after the block was placed.
        let mut state = block.state();

        let Some(container) = state.persistent_data_mut() else {
            return WriteOutcome::Unsupported;
        };
        let result = container
            .set_string(key, value)
            .and_then(|()| state.update());

        match result {
            Ok(()) => WriteOutcome::Stored,
            Err(e) => {
                error!("Please check if your server software is up to date!");
                error!("{}", self.host);
                error!(
                    "An error was thrown while trying to set persistent data {} for block at {}: {}",
                    key,
                    block.location(),
                    e
                );
                WriteOutcome::Failed
            }
        }
    }

    /// Value stored under the service key
    pub fn get_block_data<B: Block>(&self, block: &B) -> Option<String> {
        self.get_block_data_with_key(block, &self.data_key)
    }

    /// Value stored under an explicit key
    pub fn get_block_data_with_key<B: Block>(&self, block: &B, key: &NamespacedKey) -> Option<String> {
        let state = block.snapshot_state();
        state.persistent_data()?.get_string(key)
    }

    /// Universal record the block points at.
    ///
    /// Text that is not a UUID counts as no reference. If the record is
    /// cached, loaded and does not know its location yet, it learns this
    /// block's.
    pub fn get_universal_data_uuid<B: Block>(&self, block: &B) -> Option<RecordId> {
        let raw = self.get_block_data_with_key(block, &self.universal_key)?;

        let id = match raw.parse::<RecordId>() {
            Ok(id) => id,
            Err(e) => {
                debug!("Ignoring universal reference at {}: {}", block.location(), e);
                return None;
            }
        };

        // Repair a missing location. An unloaded record's location is
        // unknown, not missing.
        if let Some(record) = self.records.cached(&id) {
            if record.is_loaded() && record.last_present().is_none() {
                record.fill_last_present(&block.location());
            }
        }

        Some(id)
    }

    /// Whether blocks of this material carry a data container.
    ///
    /// Pure classification lookup; never materializes block state, so it is
    /// safe for bulk world scans.
    #[must_use]
    pub fn is_tile_entity(material: Option<Material>) -> bool {
        match material {
            // Cannot store data on air
            None => false,
            Some(m) if m.is_air() => false,
            Some(m) => TILE_ENTITIES.is_tagged(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWorld;
    use std::sync::{Mutex, mpsc};
    use tiledata_common::Location;
    use tiledata_common::config::RecordStoreConfig;
    use tiledata_record::{
        FieldOp, LAST_PRESENT_FIELD, MemoryBackend, RecordBackend, RecordResult, RecordStore,
    };

    fn store() -> Arc<RecordStore> {
        Arc::new(RecordStore::new(
            Arc::new(MemoryBackend::new()),
            RecordStoreConfig {
                background_flush: false,
                ..Default::default()
            },
        ))
    }

    fn service(records: Arc<RecordStore>) -> BlockDataService {
        BlockDataService::new(&BlockDataConfig::default(), HostInfo::default(), records).unwrap()
    }

    #[test]
    fn test_keys() {
        let service = service(store());
        assert_eq!(service.key().to_string(), "tiledata:block_data");
        assert_eq!(service.universal_key().to_string(), "tiledata:universal_data_uuid");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BlockDataConfig {
            namespace: "Not Valid".into(),
            ..Default::default()
        };
        assert!(BlockDataService::new(&config, HostInfo::default(), store()).is_err());
    }

    #[test]
    fn test_tile_entity_write_then_read() {
        let world = MemoryWorld::new("world");
        world.set_block(0, 64, 0, Material::Furnace);
        let block = world.block_at(0, 64, 0);
        let service = service(store());

        assert_eq!(service.set_block_data(&block, "42"), WriteOutcome::Stored);
        assert_eq!(service.get_block_data(&block).as_deref(), Some("42"));
    }

    #[test]
    fn test_power_scenario_with_explicit_key() {
        let world = MemoryWorld::new("world");
        world.set_block(1, 1, 1, Material::Hopper);
        world.set_block(2, 2, 2, Material::Stone);
        let service = service(store());
        let power = NamespacedKey::new("tiledata", "power").unwrap();

        let tile = world.block_at(1, 1, 1);
        assert!(service.set_block_data_with_key(&tile, &power, "42").is_stored());
        assert_eq!(service.get_block_data_with_key(&tile, &power).as_deref(), Some("42"));

        let plain = world.block_at(2, 2, 2);
        assert_eq!(
            service.set_block_data_with_key(&plain, &power, "42"),
            WriteOutcome::Unsupported
        );
        assert_eq!(service.get_block_data_with_key(&plain, &power), None);
    }

    #[test]
    fn test_unwritten_key_reads_empty() {
        let world = MemoryWorld::new("world");
        world.set_block(0, 0, 0, Material::Chest);
        let service = service(store());

        assert_eq!(service.get_block_data(&world.block_at(0, 0, 0)), None);
        assert_eq!(service.get_block_data(&world.block_at(9, 9, 9)), None);
    }

    #[test]
    fn test_keys_do_not_collide() {
        let world = MemoryWorld::new("world");
        world.set_block(0, 0, 0, Material::Barrel);
        let block = world.block_at(0, 0, 0);
        let service = service(store());

        service.set_block_data(&block, "payload");
        service.set_universal_data_uuid(&block, RecordId::new());
        assert_eq!(service.get_block_data(&block).as_deref(), Some("payload"));
    }

    #[test]
    fn test_write_uses_current_state_and_read_uses_snapshot() {
        let world = MemoryWorld::new("world");
        world.set_block(0, 0, 0, Material::Chest);
        let block = world.block_at(0, 0, 0);
        let service = service(store());

        service.set_block_data(&block, "v");
        assert_eq!((world.current_reads(), world.snapshot_reads()), (1, 0));

        service.get_block_data(&block);
        assert_eq!((world.current_reads(), world.snapshot_reads()), (1, 1));
    }

    #[test]
    fn test_native_failure_is_absorbed() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let world = MemoryWorld::new("world");
        world.set_block(0, 0, 0, Material::Dispenser);
        let block = world.block_at(0, 0, 0);
        let service = service(store());

        assert!(service.set_block_data(&block, "first").is_stored());

        world.set_fail_writes(true);
        assert_eq!(service.set_block_data(&block, "second"), WriteOutcome::Failed);

        world.set_fail_writes(false);
        assert_eq!(service.get_block_data(&block).as_deref(), Some("first"));
    }

    #[test]
    fn test_universal_reference_roundtrip() {
        let world = MemoryWorld::new("world");
        world.set_block(0, 0, 0, Material::Chest);
        let block = world.block_at(0, 0, 0);
        let service = service(store());
        let id = RecordId::new();

        assert!(service.set_universal_data_uuid(&block, id).is_stored());
        assert_eq!(service.get_universal_data_uuid(&block), Some(id));
    }

    #[test]
    fn test_malformed_universal_reference_is_absent() {
        let world = MemoryWorld::new("world");
        world.set_block(0, 0, 0, Material::Chest);
        let block = world.block_at(0, 0, 0);
        let service = service(store());

        let universal = service.universal_key().clone();
        service.set_block_data_with_key(&block, &universal, "definitely-not-a-uuid");

        assert_eq!(service.get_universal_data_uuid(&block), None);
        // Passive handling: the text stays where it was
        assert_eq!(
            service.get_block_data_with_key(&block, &universal).as_deref(),
            Some("definitely-not-a-uuid")
        );
    }

    #[test]
    fn test_universal_reference_backfills_location() {
        let world = MemoryWorld::new("world");
        world.set_block(5, 70, -5, Material::EnchantingTable);
        let block = world.block_at(5, 70, -5);
        let records = store();
        let service = service(records.clone());

        let record = records.create_record();
        assert!(record.last_present().is_none());

        service.set_universal_data_uuid(&block, record.id());
        assert_eq!(service.get_universal_data_uuid(&block), Some(record.id()));
        assert_eq!(record.last_present(), Some(Location::new("world", 5, 70, -5)));
    }

    #[test]
    fn test_universal_reference_keeps_known_location() {
        let world = MemoryWorld::new("world");
        world.set_block(0, 0, 0, Material::Chest);
        let block = world.block_at(0, 0, 0);
        let records = store();
        let service = service(records.clone());

        let record = records.create_record();
        let elsewhere = Location::new("world_nether", 1, 2, 3);
        record.set_last_present(elsewhere.clone());

        service.set_universal_data_uuid(&block, record.id());
        service.get_universal_data_uuid(&block);
        assert_eq!(record.last_present(), Some(elsewhere));
    }

    /// Backend whose first `load_fields` call waits for a release signal
    #[derive(Default)]
    struct HeldBackend {
        inner: MemoryBackend,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl RecordBackend for HeldBackend {
        fn name(&self) -> &'static str {
            "held"
        }

        fn load_fields(&self, record: &RecordId) -> RecordResult<Vec<(String, String)>> {
            let release = self.release.lock().unwrap().take();
            if let Some(release) = release {
                release.recv().unwrap();
            }
            self.inner.load_fields(record)
        }

        fn list_records(&self) -> RecordResult<Vec<RecordId>> {
            self.inner.list_records()
        }

        fn apply_batch(&self, ops: &[FieldOp]) -> RecordResult<()> {
            self.inner.apply_batch(ops)
        }

        fn delete_record(&self, record: &RecordId) -> RecordResult<()> {
            self.inner.delete_record(record)
        }
    }

    #[test]
    fn test_loading_record_keeps_stored_location() {
        let id = RecordId::new();
        let stored = Location::new("world", 1, 2, 3);
        let backend = Arc::new(HeldBackend::default());
        backend
            .inner
            .apply_batch(&[FieldOp::Put {
                record: id,
                field: LAST_PRESENT_FIELD.into(),
                value: stored.to_string(),
            }])
            .unwrap();
        let (release_tx, release_rx) = mpsc::channel();
        *backend.release.lock().unwrap() = Some(release_rx);

        let records = Arc::new(RecordStore::new(
            backend,
            RecordStoreConfig {
                background_flush: false,
                ..Default::default()
            },
        ));
        let service = service(records.clone());

        let world = MemoryWorld::new("world");
        world.set_block(9, 9, 9, Material::Chest);
        let block = world.block_at(9, 9, 9);
        service.set_universal_data_uuid(&block, id);

        let record = records.load_record_in_background(id);
        assert!(!record.is_loaded());

        assert_eq!(service.get_universal_data_uuid(&block), Some(id));
        assert_eq!(record.last_present(), None);
        assert_eq!(records.pending_writes(), 0);

        release_tx.send(()).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !record.is_loaded() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(record.is_loaded());
        assert_eq!(record.last_present(), Some(stored));

        // Loaded with a known location: nothing to repair
        service.get_universal_data_uuid(&block);
        assert_eq!(records.pending_writes(), 0);
    }

    #[test]
    fn test_universal_reference_to_uncached_record() {
        let world = MemoryWorld::new("world");
        world.set_block(0, 0, 0, Material::Chest);
        let block = world.block_at(0, 0, 0);
        let records = store();
        let service = service(records.clone());
        let id = RecordId::new();

        service.set_universal_data_uuid(&block, id);
        assert_eq!(service.get_universal_data_uuid(&block), Some(id));
        assert!(records.cached(&id).is_none());
    }

    #[test]
    fn test_is_tile_entity() {
        assert!(!BlockDataService::is_tile_entity(None));
        assert!(!BlockDataService::is_tile_entity(Some(Material::Air)));
        assert!(!BlockDataService::is_tile_entity(Some(Material::CaveAir)));
        assert!(!BlockDataService::is_tile_entity(Some(Material::VoidAir)));
        assert!(!BlockDataService::is_tile_entity(Some(Material::Stone)));
        assert!(BlockDataService::is_tile_entity(Some(Material::Chest)));
        assert!(BlockDataService::is_tile_entity(Some(Material::Beacon)));
    }

    #[test]
    fn test_bulk_scan_does_not_materialize_state() {
        let world = MemoryWorld::new("world");
        for x in 0..16 {
            for z in 0..16 {
                let material = if (x + z) % 5 == 0 { Material::Chest } else { Material::Dirt };
                world.set_block(x, 60, z, material);
            }
        }

        let tiles = (0..16)
            .flat_map(|x| (0..16).map(move |z| (x, z)))
            .filter(|&(x, z)| {
                BlockDataService::is_tile_entity(Some(world.block_at(x, 60, z).material()))
            })
            .count();

        assert!(tiles > 0);
        assert_eq!(world.current_reads() + world.snapshot_reads(), 0);
    }

    #[test]
    fn test_service_shared_across_threads() {
        let world = Arc::new(MemoryWorld::new("world"));
        for x in 0..8 {
            world.set_block(x, 0, 0, Material::Chest);
        }
        let service = Arc::new(service(store()));

        let handles: Vec<_> = (0..8)
            .map(|x| {
                let world = Arc::clone(&world);
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    let block = world.block_at(x, 0, 0);
                    service.set_block_data(&block, &x.to_string())
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_stored());
        }
        for x in 0..8 {
            assert_eq!(
                service.get_block_data(&world.block_at(x, 0, 0)),
                Some(x.to_string())
            );
        }
    }
}
