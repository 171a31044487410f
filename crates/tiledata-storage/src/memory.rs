//! In-memory world
//!
//! Implements the native storage contract on a concurrent map of blocks.
//! Blocks whose material is a tile entity carry a data container; all other
//! blocks materialize a plain state without one. Failure injection and
//! materialization counters make the adapter's behavior observable.

use crate::error::NativeError;
use crate::world::{Block, BlockState, PersistentDataContainer};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tiledata_common::{Location, Material, NamespacedKey, TILE_ENTITIES};

#[derive(Clone, Debug)]
struct StoredBlock {
    material: Material,
    data: HashMap<NamespacedKey, String>,
}

/// A single named world held in memory
#[derive(Debug)]
pub struct MemoryWorld {
    name: String,
    blocks: DashMap<(i32, i32, i32), StoredBlock>,
    fail_writes: AtomicBool,
    current_reads: AtomicU64,
    snapshot_reads: AtomicU64,
}

impl MemoryWorld {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: DashMap::new(),
            fail_writes: AtomicBool::new(false),
            current_reads: AtomicU64::new(0),
            snapshot_reads: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Place a block. Any data attached to the previous block is lost.
    pub fn set_block(&self, x: i32, y: i32, z: i32, material: Material) {
        self.blocks.insert(
            (x, y, z),
            StoredBlock {
                material,
                data: HashMap::new(),
            },
        );
    }

    /// Handle to the block at a position (air if nothing was placed)
    #[must_use]
    pub fn block_at(&self, x: i32, y: i32, z: i32) -> MemoryBlock<'_> {
        MemoryBlock {
            world: self,
            pos: (x, y, z),
        }
    }

    /// Make every native write and commit fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of states materialized through `Block::state`
    #[must_use]
    pub fn current_reads(&self) -> u64 {
        self.current_reads.load(Ordering::Relaxed)
    }

    /// Number of states materialized through `Block::snapshot_state`
    #[must_use]
    pub fn snapshot_reads(&self) -> u64 {
        self.snapshot_reads.load(Ordering::Relaxed)
    }

    fn material_at(&self, pos: (i32, i32, i32)) -> Material {
        self.blocks.get(&pos).map_or(Material::Air, |b| b.material)
    }

    fn materialize(&self, pos: (i32, i32, i32)) -> MemoryState<'_> {
        let (material, data) = self
            .blocks
            .get(&pos)
            .map_or((Material::Air, None), |b| (b.material, Some(b.data.clone())));

        let container = TILE_ENTITIES.is_tagged(material).then(|| MemoryContainer {
            values: data.unwrap_or_default(),
            fail_writes: self.fail_writes.load(Ordering::Relaxed),
        });

        MemoryState {
            world: self,
            pos,
            material,
            container,
        }
    }
}

/// Block handle into a `MemoryWorld`
#[derive(Clone, Copy, Debug)]
pub struct MemoryBlock<'w> {
    world: &'w MemoryWorld,
    pos: (i32, i32, i32),
}

impl<'w> Block for MemoryBlock<'w> {
    type State = MemoryState<'w>;

    fn location(&self) -> Location {
        Location::new(self.world.name.clone(), self.pos.0, self.pos.1, self.pos.2)
    }

    fn material(&self) -> Material {
        self.world.material_at(self.pos)
    }

    fn state(&self) -> MemoryState<'w> {
        self.world.current_reads.fetch_add(1, Ordering::Relaxed);
        self.world.materialize(self.pos)
    }

    fn snapshot_state(&self) -> MemoryState<'w> {
        self.world.snapshot_reads.fetch_add(1, Ordering::Relaxed);
        self.world.materialize(self.pos)
    }
}

/// Detached copy of a block's state
#[derive(Debug)]
pub struct MemoryState<'w> {
    world: &'w MemoryWorld,
    pos: (i32, i32, i32),
    material: Material,
    container: Option<MemoryContainer>,
}

impl BlockState for MemoryState<'_> {
    type Container = MemoryContainer;

    fn persistent_data(&self) -> Option<&MemoryContainer> {
        self.container.as_ref()
    }

    fn persistent_data_mut(&mut self) -> Option<&mut MemoryContainer> {
        self.container.as_mut()
    }

    fn update(&mut self) -> Result<(), NativeError> {
        if self.world.fail_writes.load(Ordering::Relaxed) {
            return Err(NativeError::CommitFailed(format!(
                "world {} refused update at {:?}",
                self.world.name, self.pos
            )));
        }

        let Some(container) = &self.container else {
            return Ok(());
        };

        // A block replaced since this state was read keeps its new identity
        match self.world.blocks.get_mut(&self.pos) {
            Some(mut block) if block.material == self.material => {
                block.data.clone_from(&container.values);
                Ok(())
            }
            _ => Err(NativeError::IncompatibleState(format!(
                "block at {:?} is no longer {}",
                self.pos, self.material
            ))),
        }
    }
}

/// Attached data of a tile entity state
#[derive(Clone, Debug, Default)]
pub struct MemoryContainer {
    values: HashMap<NamespacedKey, String>,
    fail_writes: bool,
}

impl PersistentDataContainer for MemoryContainer {
    fn get_string(&self, key: &NamespacedKey) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_string(&mut self, key: &NamespacedKey, value: &str) -> Result<(), NativeError> {
        if self.fail_writes {
            return Err(NativeError::Rejected(format!("cannot store {key}")));
        }
        self.values.insert(key.clone(), value.to_string());
        Ok(())
    }
}
