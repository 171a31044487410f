//! Core type definitions for TileData
//!
//! This module defines the fundamental types used throughout the system:
//! record identifiers, namespaced storage keys, world locations and the
//! material classification used to decide whether a block can carry data.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::error::Error;

/// Unique identifier for a universal record
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a new random record ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidRecordId(format!("{s:?}: {e}")))
    }
}

/// A `namespace:key` pair identifying one entry in a block's attached storage
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{namespace}:{key}")]
pub struct NamespacedKey {
    namespace: String,
    key: String,
}

impl NamespacedKey {
    /// Create a new namespaced key (validates both halves)
    pub fn new(
        namespace: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<Self, NamespacedKeyError> {
        let namespace = namespace.into();
        let key = key.into();
        Self::validate(&namespace, &key)?;
        Ok(Self { namespace, key })
    }

    /// Get the namespace half
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get the key half
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn validate(namespace: &str, key: &str) -> Result<(), NamespacedKeyError> {
        if namespace.is_empty() {
            return Err(NamespacedKeyError::EmptyNamespace);
        }
        if key.is_empty() {
            return Err(NamespacedKeyError::EmptyKey);
        }
        if namespace.len() + key.len() + 1 > 255 {
            return Err(NamespacedKeyError::TooLong);
        }

        let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c);
        if let Some(c) = namespace.chars().find(|&c| !allowed(c)) {
            return Err(NamespacedKeyError::InvalidNamespaceChar(c));
        }
        // Keys may additionally contain path separators
        if let Some(c) = key.chars().find(|&c| !allowed(c) && c != '/') {
            return Err(NamespacedKeyError::InvalidKeyChar(c));
        }

        Ok(())
    }
}

impl fmt::Debug for NamespacedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamespacedKey({}:{})", self.namespace, self.key)
    }
}

/// Errors that can occur when creating a namespaced key
#[derive(Debug, Clone, thiserror::Error)]
pub enum NamespacedKeyError {
    #[error("namespace cannot be empty")]
    EmptyNamespace,
    #[error("key cannot be empty")]
    EmptyKey,
    #[error("namespaced key cannot exceed 255 characters")]
    TooLong,
    #[error("namespace contains invalid character: {0}")]
    InvalidNamespaceChar(char),
    #[error("key contains invalid character: {0}")]
    InvalidKeyChar(char),
}

/// An addressable block position in a named world
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Location {
    #[must_use]
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }
}

/// Serialized as `world;x;y;z`
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{};{}", self.world, self.x, self.y, self.z)
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidLocation(s.to_string());

        // World names may contain ';', so split the coordinates off the right
        let mut parts = s.rsplitn(4, ';');
        let z = parts.next().ok_or_else(invalid)?;
        let y = parts.next().ok_or_else(invalid)?;
        let x = parts.next().ok_or_else(invalid)?;
        let world = parts.next().filter(|w| !w.is_empty()).ok_or_else(invalid)?;

        Ok(Self {
            world: world.to_string(),
            x: x.parse().map_err(|_| invalid())?,
            y: y.parse().map_err(|_| invalid())?,
            z: z.parse().map_err(|_| invalid())?,
        })
    }
}

/// Block material classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Material {
    Air,
    CaveAir,
    VoidAir,
    Stone,
    Dirt,
    GrassBlock,
    OakLog,
    Glass,
    IronBlock,
    Chest,
    TrappedChest,
    EnderChest,
    Barrel,
    ShulkerBox,
    Furnace,
    BlastFurnace,
    Smoker,
    Hopper,
    Dispenser,
    Dropper,
    BrewingStand,
    EnchantingTable,
    Beacon,
    Spawner,
    OakSign,
    PlayerHead,
    Jukebox,
    Lectern,
    Campfire,
    Beehive,
    Bell,
    Conduit,
    Comparator,
    DaylightDetector,
    EndGateway,
    CommandBlock,
    StructureBlock,
}

impl Material {
    /// Whether this material is one of the air variants
    #[must_use]
    pub const fn is_air(self) -> bool {
        matches!(self, Self::Air | Self::CaveAir | Self::VoidAir)
    }
}

/// A named, static set of materials
pub struct MaterialTag {
    name: &'static str,
    members: HashSet<Material>,
}

impl MaterialTag {
    fn new(name: &'static str, members: &[Material]) -> Self {
        Self {
            name,
            members: members.iter().copied().collect(),
        }
    }

    /// Tag name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the material belongs to this tag
    #[must_use]
    pub fn is_tagged(&self, material: Material) -> bool {
        self.members.contains(&material)
    }

    /// Iterate over tagged materials (unordered)
    pub fn values(&self) -> impl Iterator<Item = Material> + '_ {
        self.members.iter().copied()
    }
}

impl fmt::Debug for MaterialTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MaterialTag({}, {} members)", self.name, self.members.len())
    }
}

/// Materials whose blocks are backed by a tile entity and therefore own an
/// attached persistent data container.
pub static TILE_ENTITIES: LazyLock<MaterialTag> = LazyLock::new(|| {
    use Material::*;
    MaterialTag::new(
        "tile_entities",
        &[
            Chest,
            TrappedChest,
            EnderChest,
            Barrel,
            ShulkerBox,
            Furnace,
            BlastFurnace,
            Smoker,
            Hopper,
            Dispenser,
            Dropper,
            BrewingStand,
            EnchantingTable,
            Beacon,
            Spawner,
            OakSign,
            PlayerHead,
            Jukebox,
            Lectern,
            Campfire,
            Beehive,
            Bell,
            Conduit,
            Comparator,
            DaylightDetector,
            EndGateway,
            CommandBlock,
            StructureBlock,
        ],
    )
});

/// Identifying information about the hosting server, included in
/// diagnostics when native storage misbehaves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostInfo {
    /// Server software name (e.g. "Paper")
    pub software: String,
    /// Full server version string
    pub version: String,
    /// API version string
    pub api_version: String,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            software: "unknown".to_string(),
            version: "unknown".to_string(),
            api_version: "unknown".to_string(),
        }
    }
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.software, self.version, self.api_version)
    }
}
