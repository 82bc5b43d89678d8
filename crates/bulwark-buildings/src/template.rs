//! Building templates: the block layout, costs and supply of each building
//! type, and their instantiation at a concrete origin and rotation.
//!
//! A handful of templates are built in. More can be loaded from RON:
//!
//! ```ron
//! [
//!     (
//!         name: "watchtower",
//!         cost: (food: 0, wood: 60, ore: 20),
//!         pop_supply: 0,
//!         min_blocks_percent: 0.2,
//!         starting_blocks: ["cobblestone"],
//!         blocks: [
//!             (offset: (x: 0, y: 0, z: 0), block: "cobblestone"),
//!             (offset: (x: 0, y: 1, z: 0), block: "log"),
//!         ],
//!     ),
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use bulwark_sim::ServerWorld;
use bulwark_voxel::{BlockPos, BlockTypeId, Rotation};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Resources;

const DEFAULT_MIN_BLOCKS_PERCENT: f32 = 0.2;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A template definition is malformed or could not be loaded.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Failed to read a template file.
    #[error("failed to read templates: {0}")]
    Read(#[from] std::io::Error),
    /// RON syntax or shape error.
    #[error("failed to parse templates: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// The template has no blocks.
    #[error("template '{0}' has no blocks")]
    EmptyLayout(String),
    /// Two blocks share an offset.
    #[error("template '{template}' has two blocks at {offset}")]
    DuplicateOffset {
        /// Template name.
        template: String,
        /// Repeated offset.
        offset: BlockPos,
    },
    /// No starting block sits on the lowest layer, so construction could
    /// never begin.
    #[error("template '{0}' has no starting block on its lowest layer")]
    NoStartingBlocks(String),
    /// `min_blocks_percent` must lie in `[0, 1)`.
    #[error("template '{template}' has min_blocks_percent {value} outside [0, 1)")]
    InvalidMinPercent {
        /// Template name.
        template: String,
        /// Offending value.
        value: f32,
    },
}

/// A placement request cannot be turned into a building.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// No template with this name.
    #[error("unknown building type '{0}'")]
    UnknownTemplate(String),
    /// The template names a block the world does not know.
    #[error("template '{template}' uses unknown block '{block}'")]
    UnknownBlock {
        /// Template name.
        template: String,
        /// Block name.
        block: String,
    },
    /// A target cell lies in an unloaded chunk.
    #[error("cell {0} is not loaded")]
    Unloaded(BlockPos),
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One block of a template, relative to the building origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDef {
    /// Offset from the origin before rotation.
    pub offset: BlockPos,
    /// Block type name.
    pub block: String,
}

/// Serializable building type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDef {
    /// Unique type name.
    pub name: String,
    /// Fixed placement cost.
    pub cost: Resources,
    /// Population supply granted once built.
    #[serde(default)]
    pub pop_supply: u32,
    /// A built building at or below this placed fraction is destroyed.
    #[serde(default = "default_min_blocks_percent")]
    pub min_blocks_percent: f32,
    /// Block types that seed construction on the lowest layer.
    pub starting_blocks: Vec<String>,
    /// Structural layout.
    pub blocks: Vec<BlockDef>,
}

fn default_min_blocks_percent() -> f32 {
    DEFAULT_MIN_BLOCKS_PERCENT
}

impl TemplateDef {
    /// Checks the layout for the problems [`TemplateError`] lists.
    pub fn validate(&self) -> Result<(), TemplateError> {
        let Some(min_y) = self.blocks.iter().map(|b| b.offset.y).min() else {
            return Err(TemplateError::EmptyLayout(self.name.clone()));
        };

        let mut seen = FxHashSet::default();
        for b in &self.blocks {
            if !seen.insert(b.offset) {
                return Err(TemplateError::DuplicateOffset {
                    template: self.name.clone(),
                    offset: b.offset,
                });
            }
        }

        if !(0.0..1.0).contains(&self.min_blocks_percent) {
            return Err(TemplateError::InvalidMinPercent {
                template: self.name.clone(),
                value: self.min_blocks_percent,
            });
        }

        let seeds = self
            .blocks
            .iter()
            .any(|b| b.offset.y == min_y && self.starting_blocks.contains(&b.block));
        if !seeds {
            return Err(TemplateError::NoStartingBlocks(self.name.clone()));
        }
        Ok(())
    }
}

/// A template resolved against a world at a concrete origin, ready to be
/// registered as a building.
#[derive(Debug, Clone)]
pub struct BuildingPlan {
    /// Template name.
    pub name: String,
    /// Owning player.
    pub owner: String,
    /// Origin cell.
    pub origin: BlockPos,
    /// Orientation.
    pub rotation: Rotation,
    /// Fixed cost.
    pub cost: Resources,
    /// Supply once built.
    pub pop_supply: u32,
    /// Destroy threshold for built buildings.
    pub min_blocks_percent: f32,
    /// World cells and the block each one should hold.
    pub cells: Vec<(BlockPos, BlockTypeId)>,
    /// Block types that seed construction.
    pub starting_types: FxHashSet<BlockTypeId>,
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// Every building type the server knows, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: BTreeMap<String, TemplateDef>,
}

impl TemplateLibrary {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in building types.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        for def in builtin_templates() {
            library.templates.insert(def.name.clone(), def);
        }
        library
    }

    /// Adds or replaces a template after validating it.
    pub fn insert(&mut self, def: TemplateDef) -> Result<(), TemplateError> {
        def.validate()?;
        if self.templates.contains_key(&def.name) {
            tracing::info!(template = %def.name, "Replacing building template");
        }
        self.templates.insert(def.name.clone(), def);
        Ok(())
    }

    /// Loads a RON list of templates. Nothing is added unless every entry
    /// is valid. Returns how many were loaded.
    pub fn load_ron(&mut self, src: &str) -> Result<usize, TemplateError> {
        let defs: Vec<TemplateDef> = ron::from_str(src)?;
        for def in &defs {
            def.validate()?;
        }
        let count = defs.len();
        for def in defs {
            self.insert(def)?;
        }
        Ok(count)
    }

    /// Loads templates from a RON file.
    pub fn load_ron_file(&mut self, path: &Path) -> Result<usize, TemplateError> {
        let src = std::fs::read_to_string(path)?;
        let count = self.load_ron(&src)?;
        tracing::info!(count, path = %path.display(), "Loaded building templates");
        Ok(count)
    }

    /// Template by name.
    pub fn get(&self, name: &str) -> Option<&TemplateDef> {
        self.templates.get(name)
    }

    /// Template names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns `true` if no templates are loaded.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Every block name any template uses, sorted and de-duplicated.
    pub fn block_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .templates
            .values()
            .flat_map(|t| t.blocks.iter().map(|b| b.block.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Resolves a template at `origin` in `world`.
    ///
    /// # Errors
    ///
    /// [`PlacementError`] if the template or one of its blocks is unknown,
    /// or if any target cell is unloaded.
    pub fn instantiate(
        &self,
        name: &str,
        world: &ServerWorld,
        origin: BlockPos,
        rotation: Rotation,
        owner: &str,
    ) -> Result<BuildingPlan, PlacementError> {
        let def = self
            .get(name)
            .ok_or_else(|| PlacementError::UnknownTemplate(name.to_string()))?;

        let mut resolved: FxHashMap<String, BlockTypeId> = FxHashMap::default();
        let mut resolve = |block: &str| -> Result<BlockTypeId, PlacementError> {
            if let Some(&id) = resolved.get(block) {
                return Ok(id);
            }
            let id = world
                .block_types()
                .lookup_by_name(block)
                .ok_or_else(|| PlacementError::UnknownBlock {
                    template: def.name.clone(),
                    block: block.to_string(),
                })?;
            resolved.insert(block.to_string(), id);
            Ok(id)
        };

        let mut cells = Vec::with_capacity(def.blocks.len());
        for b in &def.blocks {
            let r = rotation.rotate(b.offset);
            let pos = origin.offset(r.x, r.y, r.z);
            if !world.blocks().is_loaded(pos) {
                return Err(PlacementError::Unloaded(pos));
            }
            cells.push((pos, resolve(&b.block)?));
        }

        let starting_types = def
            .starting_blocks
            .iter()
            .map(|s| resolve(s))
            .collect::<Result<FxHashSet<_>, _>>()?;

        Ok(BuildingPlan {
            name: def.name.clone(),
            owner: owner.to_string(),
            origin,
            rotation,
            cost: def.cost,
            pop_supply: def.pop_supply,
            min_blocks_percent: def.min_blocks_percent,
            cells,
            starting_types,
        })
    }
}

// ---------------------------------------------------------------------------
// Built-in templates
// ---------------------------------------------------------------------------

/// Materials for a rectangular shell.
struct Shell<'a> {
    width: i32,
    height: i32,
    depth: i32,
    floor: &'a str,
    wall: &'a str,
    corner: &'a str,
    roof: &'a str,
}

impl Shell<'_> {
    /// Floor, perimeter walls with a two-high doorway on the front face,
    /// and a flat roof. The interior is left empty.
    fn blocks(&self) -> Vec<BlockDef> {
        let mut blocks = Vec::new();
        let door_x = self.width / 2;
        for y in 0..self.height {
            for x in 0..self.width {
                for z in 0..self.depth {
                    let edge_x = x == 0 || x == self.width - 1;
                    let edge_z = z == 0 || z == self.depth - 1;
                    let block = if y == 0 {
                        self.floor
                    } else if y == self.height - 1 {
                        self.roof
                    } else if edge_x && edge_z {
                        self.corner
                    } else if edge_x || edge_z {
                        if z == 0 && x == door_x && y <= 2 {
                            continue;
                        }
                        self.wall
                    } else {
                        continue;
                    };
                    blocks.push(BlockDef {
                        offset: BlockPos::new(x, y, z),
                        block: block.to_string(),
                    });
                }
            }
        }
        blocks
    }
}

fn builtin_templates() -> Vec<TemplateDef> {
    let farm_blocks = (0..5)
        .flat_map(|x| (0..5).map(move |z| (x, z)))
        .map(|(x, z)| BlockDef {
            offset: BlockPos::new(x, 0, z),
            block: if x == 2 && z == 2 { "water" } else { "farmland" }.to_string(),
        })
        .collect();

    vec![
        TemplateDef {
            name: "town_centre".into(),
            cost: Resources::new(0, 300, 100),
            pop_supply: 10,
            min_blocks_percent: 0.3,
            starting_blocks: vec!["stone_bricks".into()],
            blocks: Shell {
                width: 7,
                height: 5,
                depth: 7,
                floor: "stone_bricks",
                wall: "planks",
                corner: "log",
                roof: "planks",
            }
            .blocks(),
        },
        TemplateDef {
            name: "house".into(),
            cost: Resources::new(0, 75, 0),
            pop_supply: 10,
            min_blocks_percent: 0.2,
            starting_blocks: vec!["cobblestone".into()],
            blocks: Shell {
                width: 5,
                height: 4,
                depth: 5,
                floor: "cobblestone",
                wall: "planks",
                corner: "log",
                roof: "planks",
            }
            .blocks(),
        },
        TemplateDef {
            name: "barracks".into(),
            cost: Resources::new(0, 125, 25),
            pop_supply: 0,
            min_blocks_percent: 0.25,
            starting_blocks: vec!["cobblestone".into()],
            blocks: Shell {
                width: 7,
                height: 5,
                depth: 5,
                floor: "cobblestone",
                wall: "stone_bricks",
                corner: "log",
                roof: "planks",
            }
            .blocks(),
        },
        TemplateDef {
            name: "farm".into(),
            cost: Resources::new(0, 50, 0),
            pop_supply: 0,
            min_blocks_percent: 0.1,
            starting_blocks: vec!["farmland".into(), "water".into()],
            blocks: farm_blocks,
        },
        TemplateDef {
            name: "blacksmith".into(),
            cost: Resources::new(0, 150, 75),
            pop_supply: 0,
            min_blocks_percent: 0.25,
            starting_blocks: vec!["cobblestone".into()],
            blocks: Shell {
                width: 5,
                height: 4,
                depth: 5,
                floor: "cobblestone",
                wall: "stone_bricks",
                corner: "iron_block",
                roof: "stone_bricks",
            }
            .blocks(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
