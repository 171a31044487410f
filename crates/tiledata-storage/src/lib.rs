//! TileData Storage - Per-block attached data
//!
//! This crate implements the adapter between string metadata and the data
//! container a block carries natively:
//! - Native storage contract (`Block`, `BlockState`, `PersistentDataContainer`)
//! - `BlockDataService`: best-effort writes, never-failing reads
//! - Universal record indirection (a UUID stored on the block)
//! - In-memory world for tests and tooling

pub mod error;
pub mod memory;
pub mod service;
pub mod world;

// Re-exports
pub use error::NativeError;
pub use memory::{MemoryBlock, MemoryContainer, MemoryState, MemoryWorld};
pub use service::{BlockDataService, WriteOutcome};
pub use world::{Block, BlockState, PersistentDataContainer};
