//! Native block storage contract
//!
//! The host world is consumed through three small traits. A `Block` hands out
//! `BlockState`s; a state may or may not expose a `PersistentDataContainer`
//! depending on whether the block is backed by a tile entity. Changes made to
//! a state's container only reach the world once the state is updated.

use crate::error::NativeError;
use tiledata_common::{Location, Material, NamespacedKey};

/// Handle to one block in the host world
pub trait Block {
    type State: BlockState;

    /// Where the block is
    fn location(&self) -> Location;

    /// Material classification; cheap, never materializes state
    fn material(&self) -> Material;

    /// Materialize the block's current state on the calling thread.
    ///
    /// Writes must go through this: an optimized state may lag behind a block
    /// that was just placed.
    fn state(&self) -> Self::State;

    /// Materialize state through the host's optimized read path.
    ///
    /// Suitable for reads only.
    fn snapshot_state(&self) -> Self::State;
}

/// Materialized state of a block
pub trait BlockState {
    type Container: PersistentDataContainer;

    /// The attached data container, if this state carries one
    fn persistent_data(&self) -> Option<&Self::Container>;

    /// Mutable access to the attached data container
    fn persistent_data_mut(&mut self) -> Option<&mut Self::Container>;

    /// Commit this state back to the world
    fn update(&mut self) -> Result<(), NativeError>;
}

/// String key-value storage attached to a block
pub trait PersistentDataContainer {
    fn get_string(&self, key: &NamespacedKey) -> Option<String>;

    fn set_string(&mut self, key: &NamespacedKey, value: &str) -> Result<(), NativeError>;
}
