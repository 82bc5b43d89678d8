//! Block type registry: maps compact [`BlockTypeId`] values to [`BlockTypeDef`]
//! metadata and back from names.
//!
//! Built once at server startup. Air is always ID 0 so that zero-filled chunk
//! memory represents empty space.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Compact identifier stored in every block cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockTypeId(pub u16);

impl BlockTypeId {
    /// Empty space.
    pub const AIR: Self = Self(0);

    /// Returns `true` for air.
    pub fn is_air(self) -> bool {
        self == Self::AIR
    }
}

/// Descriptor for a block type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockTypeDef {
    /// Unique name (e.g. "cobblestone", "oak_planks").
    pub name: String,
    /// Whether units collide with and explosions can destroy this block.
    pub solid: bool,
}

impl BlockTypeDef {
    /// A solid block type with the given name.
    pub fn solid(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            solid: true,
        }
    }
}

/// Errors that can occur during block type registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A type with the same name has already been registered.
    #[error("duplicate block type name: {0}")]
    DuplicateName(String),
    /// Every `u16` slot is taken.
    #[error("block type registry is full (max 65536 types)")]
    RegistryFull,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Dense `BlockTypeId → BlockTypeDef` table with reverse lookup by name.
#[derive(Debug, Clone)]
pub struct BlockTypeRegistry {
    types: Vec<BlockTypeDef>,
    name_to_id: FxHashMap<String, BlockTypeId>,
}

impl BlockTypeRegistry {
    /// Creates a registry with only air registered.
    pub fn new() -> Self {
        let air = BlockTypeDef {
            name: "air".to_string(),
            solid: false,
        };
        let mut name_to_id = FxHashMap::default();
        name_to_id.insert(air.name.clone(), BlockTypeId::AIR);
        Self {
            types: vec![air],
            name_to_id,
        }
    }

    /// Creates a registry and registers a solid type for each name, in order.
    ///
    /// # Errors
    ///
    /// Fails on the first duplicate name.
    pub fn with_solids<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for name in names {
            registry.register(BlockTypeDef::solid(name))?;
        }
        Ok(registry)
    }

    /// Registers a new block type and returns its ID. IDs are sequential from 1.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateName`] if the name is taken,
    /// [`RegistryError::RegistryFull`] if no IDs are left.
    pub fn register(&mut self, def: BlockTypeDef) -> Result<BlockTypeId, RegistryError> {
        if self.name_to_id.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if self.types.len() > u16::MAX as usize {
            return Err(RegistryError::RegistryFull);
        }

        let id = BlockTypeId(self.types.len() as u16);
        self.name_to_id.insert(def.name.clone(), id);
        self.types.push(def);
        Ok(id)
    }

    /// Definition for `id`, or `None` for IDs this registry never issued.
    pub fn get(&self, id: BlockTypeId) -> Option<&BlockTypeDef> {
        self.types.get(id.0 as usize)
    }

    /// ID for a named block type.
    pub fn lookup_by_name(&self, name: &str) -> Option<BlockTypeId> {
        self.name_to_id.get(name).copied()
    }

    /// Name of a block type, `"unknown"` for foreign IDs.
    pub fn name_of(&self, id: BlockTypeId) -> &str {
        self.get(id).map_or("unknown", |def| def.name.as_str())
    }

    /// Returns `true` if `id` is solid. Unknown IDs are treated like air.
    pub fn is_solid(&self, id: BlockTypeId) -> bool {
        self.get(id).is_some_and(|def| def.solid)
    }

    /// Total number of registered types, air included.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if only air is registered.
    pub fn is_empty(&self) -> bool {
        self.types.len() <= 1
    }
}

impl Default for BlockTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_id_zero() {
        let registry = BlockTypeRegistry::new();
        let air = registry.get(BlockTypeId::AIR).unwrap();
        assert_eq!(air.name, "air");
        assert!(!air.solid);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_returns_sequential_ids() {
        let registry = BlockTypeRegistry::with_solids(["cobblestone", "oak_planks", "oak_log"]).unwrap();
        assert_eq!(registry.lookup_by_name("cobblestone"), Some(BlockTypeId(1)));
        assert_eq!(registry.lookup_by_name("oak_planks"), Some(BlockTypeId(2)));
        assert_eq!(registry.lookup_by_name("oak_log"), Some(BlockTypeId(3)));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = BlockTypeRegistry::new();
        registry.register(BlockTypeDef::solid("stone")).unwrap();
        let result = registry.register(BlockTypeDef::solid("stone"));
        assert_eq!(result, Err(RegistryError::DuplicateName("stone".to_string())));
    }

    #[test]
    fn test_unknown_id_is_not_solid() {
        let registry = BlockTypeRegistry::with_solids(["stone"]).unwrap();
        assert!(registry.is_solid(BlockTypeId(1)));
        assert!(!registry.is_solid(BlockTypeId::AIR));
        assert!(!registry.is_solid(BlockTypeId(999)));
        assert_eq!(registry.name_of(BlockTypeId(999)), "unknown");
    }
}
