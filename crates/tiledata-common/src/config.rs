//! Configuration types for TileData
//!
//! This module defines configuration structures used across components.
//! Values are layered from an optional file and `TILEDATA__*` environment
//! variables (e.g. `TILEDATA__RECORD_STORE__FLUSH_INTERVAL_SECS=5`).

use crate::error::Result;
use crate::types::HostInfo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "TILEDATA";

/// Root configuration for TileData
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-block attached storage configuration
    pub block_data: BlockDataConfig,
    /// Universal record store configuration
    pub record_store: RecordStoreConfig,
    /// Host identification used in diagnostics
    pub host: HostInfo,
}

impl Config {
    /// Load configuration from an optional file plus environment overrides.
    ///
    /// A missing file is not an error; defaults apply for anything unset.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Parse configuration from a TOML document (no environment overrides)
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Attached block storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDataConfig {
    /// Namespace owning both storage keys
    pub namespace: String,
    /// Key for the general per-block payload
    pub data_key: String,
    /// Key holding the universal record UUID
    pub universal_key: String,
}

impl Default for BlockDataConfig {
    fn default() -> Self {
        Self {
            namespace: "tiledata".to_string(),
            data_key: "block_data".to_string(),
            universal_key: "universal_data_uuid".to_string(),
        }
    }
}

/// Universal record store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordStoreConfig {
    /// Path of the record database
    pub db_path: PathBuf,
    /// Run a background thread that flushes pending writes
    pub background_flush: bool,
    /// Background flush interval (seconds)
    pub flush_interval_secs: u64,
    /// Pending write count that triggers an early background flush
    pub flush_threshold: usize,
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/records.redb"),
            background_flush: true,
            flush_interval_secs: 30,
            flush_threshold: 1000,
        }
    }
}

impl RecordStoreConfig {
    /// Background flush interval as a `Duration`
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}
