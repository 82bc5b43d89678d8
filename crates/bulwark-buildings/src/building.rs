//! A single placed building: its footprint, construction queue, progress,
//! decay and teardown.
//!
//! Progress is always measured against the live world. Every tick the
//! building recounts which of its cells actually hold the expected block, so
//! cells destroyed by explosions or players lower the placed fraction
//! without any explicit notification.

use std::collections::VecDeque;

use bulwark_config::BuildingsConfig;
use bulwark_sim::{BuildingId, Explosion, ServerWorld};
use bulwark_voxel::{BlockPos, BlockTypeId, ChunkPos, Rotation};
use glam::DVec3;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ledger::Resources;
use crate::template::BuildingPlan;

/// Construction and damage tuning shared by every building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildingTuning {
    /// Builder work units per placed block.
    pub ticks_per_block: u32,
    /// Manual breaks between two assisted explosions. Zero disables them.
    pub breaks_per_explosion: u32,
    /// Radius of an assisted explosion.
    pub assist_explosion_radius: f64,
    /// Built buildings below this fraction decay.
    pub decay_threshold: f32,
    /// Ticks between two decayed blocks.
    pub decay_interval_ticks: u32,
    /// Radius of the teardown explosion.
    pub teardown_explosion_radius: f64,
}

impl From<&BuildingsConfig> for BuildingTuning {
    fn from(config: &BuildingsConfig) -> Self {
        Self {
            ticks_per_block: config.ticks_per_block,
            breaks_per_explosion: config.breaks_per_explosion,
            assist_explosion_radius: config.assist_explosion_radius,
            decay_threshold: config.decay_threshold,
            decay_interval_ticks: config.decay_interval_ticks,
            teardown_explosion_radius: config.teardown_explosion_radius,
        }
    }
}

impl Default for BuildingTuning {
    fn default() -> Self {
        Self::from(&BuildingsConfig::default())
    }
}

/// One live building.
#[derive(Debug, Clone)]
pub struct Building {
    id: BuildingId,
    name: String,
    owner: String,
    origin: BlockPos,
    rotation: Rotation,
    cost: Resources,
    pop_supply: u32,
    min_blocks_percent: f32,
    tuning: BuildingTuning,

    cells: Vec<(BlockPos, BlockTypeId)>,
    layout: FxHashMap<BlockPos, BlockTypeId>,
    bounds_min: BlockPos,
    bounds_max: BlockPos,
    starting_types: FxHashSet<BlockTypeId>,

    queue: VecDeque<BlockPos>,
    queued: FxHashSet<BlockPos>,
    blocks_placed: u32,
    is_built: bool,
    work: u32,
    decay_ticks: u32,
    manual_breaks: u32,
    forced_chunks: Vec<ChunkPos>,
    destroyed: bool,
    torn_down: bool,
}

impl Building {
    /// Creates an unregistered building from a resolved plan. Nothing is
    /// written to the world.
    pub fn new(id: BuildingId, plan: BuildingPlan, tuning: BuildingTuning) -> Self {
        let layout: FxHashMap<BlockPos, BlockTypeId> = plan.cells.iter().copied().collect();
        let first = plan.cells.first().map(|(p, _)| *p).unwrap_or(plan.origin);
        let (bounds_min, bounds_max) = plan
            .cells
            .iter()
            .fold((first, first), |(lo, hi), (p, _)| (lo.min(*p), hi.max(*p)));

        Self {
            id,
            name: plan.name,
            owner: plan.owner,
            origin: plan.origin,
            rotation: plan.rotation,
            cost: plan.cost,
            pop_supply: plan.pop_supply,
            min_blocks_percent: plan.min_blocks_percent,
            tuning,
            cells: plan.cells,
            layout,
            bounds_min,
            bounds_max,
            starting_types: plan.starting_types,
            queue: VecDeque::new(),
            queued: FxHashSet::default(),
            blocks_placed: 0,
            is_built: false,
            work: 0,
            decay_ticks: 0,
            manual_breaks: 0,
            forced_chunks: Vec::new(),
            destroyed: false,
            torn_down: false,
        }
    }

    // --- identity ---

    /// Registry handle.
    pub fn id(&self) -> BuildingId {
        self.id
    }

    /// Template name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning player.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Origin cell.
    pub fn origin(&self) -> BlockPos {
        self.origin
    }

    /// Orientation.
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Fixed cost paid at placement.
    pub fn cost(&self) -> Resources {
        self.cost
    }

    /// Population supply while built.
    pub fn pop_supply(&self) -> u32 {
        self.pop_supply
    }

    /// Placed fraction at or below which a built building is destroyed.
    pub fn min_blocks_percent(&self) -> f32 {
        self.min_blocks_percent
    }

    // --- progress ---

    /// Structural cells currently standing, as of the last recount.
    pub fn blocks_placed(&self) -> u32 {
        self.blocks_placed
    }

    /// Number of structural cells.
    pub fn total_blocks(&self) -> u32 {
        self.cells.len() as u32
    }

    /// Standing fraction of the structure in `[0, 1]`.
    pub fn blocks_placed_percent(&self) -> f32 {
        if self.cells.is_empty() {
            return 0.0;
        }
        self.blocks_placed as f32 / self.cells.len() as f32
    }

    /// Latches once the structure has been complete.
    pub fn is_built(&self) -> bool {
        self.is_built
    }

    /// Cells waiting to be placed, front first.
    pub fn queued_blocks(&self) -> impl Iterator<Item = BlockPos> + '_ {
        self.queue.iter().copied()
    }

    /// Length of the placement queue.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Structural cells with their expected block types.
    pub fn cells(&self) -> &[(BlockPos, BlockTypeId)] {
        &self.cells
    }

    /// Centre of the bounding box.
    pub fn center(&self) -> DVec3 {
        (self.bounds_min.center() + self.bounds_max.center()) * 0.5
    }

    /// Chunks this building currently keeps resident.
    pub fn forced_chunks(&self) -> &[ChunkPos] {
        &self.forced_chunks
    }

    // --- footprint ---

    /// Returns `true` if `pos` belongs to the building. With
    /// `include_interior`, any cell inside the bounding box counts.
    pub fn occupies(&self, pos: BlockPos, include_interior: bool) -> bool {
        if include_interior {
            (self.bounds_min.x..=self.bounds_max.x).contains(&pos.x)
                && (self.bounds_min.y..=self.bounds_max.y).contains(&pos.y)
                && (self.bounds_min.z..=self.bounds_max.z).contains(&pos.z)
        } else {
            self.layout.contains_key(&pos)
        }
    }

    fn is_cell_placed(&self, world: &ServerWorld, pos: BlockPos) -> bool {
        match self.layout.get(&pos) {
            Some(&expected) => world.block(pos) == Some(expected),
            None => false,
        }
    }

    /// Recounts standing cells from the world.
    pub fn recount(&mut self, world: &ServerWorld) -> u32 {
        self.blocks_placed = self
            .cells
            .iter()
            .filter(|(pos, block)| world.block(*pos) == Some(*block))
            .count() as u32;
        self.blocks_placed
    }

    // --- queue ---

    /// Queues a structural cell. Returns `false` for cells outside the layout
    /// or already queued.
    pub fn add_to_queue(&mut self, pos: BlockPos) -> bool {
        if !self.layout.contains_key(&pos) || !self.queued.insert(pos) {
            return false;
        }
        self.queue.push_back(pos);
        true
    }

    /// Queues every cell on the lowest layer whose block is a starting type.
    /// Returns how many were queued.
    pub fn seed_starting_layer(&mut self) -> usize {
        let Some(min_y) = self.cells.iter().map(|(p, _)| p.y).min() else {
            return 0;
        };
        let seeds: Vec<BlockPos> = self
            .cells
            .iter()
            .filter(|(p, b)| p.y == min_y && self.starting_types.contains(b))
            .map(|(p, _)| *p)
            .collect();
        seeds.into_iter().filter(|p| self.add_to_queue(*p)).count()
    }

    fn pop_queue(&mut self) -> Option<BlockPos> {
        let pos = self.queue.pop_front()?;
        self.queued.remove(&pos);
        Some(pos)
    }

    /// Materialises the next unplaced queued cell and queues its unplaced
    /// structural neighbours. Returns `false` once nothing could be placed.
    fn place_next(&mut self, world: &mut ServerWorld) -> bool {
        while let Some(pos) = self.pop_queue() {
            let Some(&block) = self.layout.get(&pos) else {
                continue;
            };
            if world.block(pos) == Some(block) {
                continue;
            }
            if let Err(err) = world.set_block(pos, block) {
                tracing::debug!(building = %self.id, %pos, %err, "Skipping unplaceable cell");
                continue;
            }
            self.blocks_placed += 1;
            for n in pos.neighbours() {
                if !self.is_cell_placed(world, n) {
                    self.add_to_queue(n);
                }
            }
            return true;
        }
        false
    }

    /// Refills an empty queue with missing cells next to standing ones, or
    /// the lowest missing layer when nothing stands next to a gap.
    fn refill_queue(&mut self, world: &ServerWorld) -> usize {
        let mut missing: Vec<BlockPos> = self
            .cells
            .iter()
            .map(|(p, _)| *p)
            .filter(|p| !self.is_cell_placed(world, *p))
            .collect();
        missing.sort_by_key(|p| (p.y, p.x, p.z));

        let mut picked: Vec<BlockPos> = missing
            .iter()
            .copied()
            .filter(|p| p.neighbours().iter().any(|n| self.is_cell_placed(world, *n)))
            .collect();
        if picked.is_empty()
            && let Some(lowest) = missing.first().map(|p| p.y)
        {
            picked = missing.into_iter().take_while(|p| p.y == lowest).collect();
        }
        picked.into_iter().filter(|p| self.add_to_queue(*p)).count()
    }

    /// Removes the highest standing cell. Returns the cleared position.
    fn decay_one(&mut self, world: &mut ServerWorld) -> Option<BlockPos> {
        let top = self
            .cells
            .iter()
            .filter(|(p, b)| world.block(*p) == Some(*b))
            .map(|(p, _)| *p)
            .max_by_key(|p| (p.y, p.x, p.z))?;
        world.set_block(top, BlockTypeId::AIR).ok()?;
        self.blocks_placed = self.blocks_placed.saturating_sub(1);
        Some(top)
    }

    // --- lifecycle ---

    /// Keeps every chunk the structure touches resident.
    pub fn force_chunks(&mut self, world: &mut ServerWorld) {
        if !self.forced_chunks.is_empty() {
            return;
        }
        let mut chunks: Vec<ChunkPos> = self.cells.iter().map(|(p, _)| p.chunk()).collect();
        chunks.sort_unstable();
        chunks.dedup();
        for chunk in &chunks {
            world.blocks_mut().force_chunk(*chunk);
        }
        self.forced_chunks = chunks;
    }

    fn release_chunks(&mut self, world: &mut ServerWorld) {
        for chunk in self.forced_chunks.drain(..) {
            world.blocks_mut().release_chunk(chunk);
        }
    }

    /// Advances construction and decay by one tick.
    pub fn tick(&mut self, world: &mut ServerWorld) {
        self.recount(world);
        if self.destroyed {
            return;
        }

        let builders = world.builders_targeting(self.id) as u32;
        if builders > 0 {
            if self.queue.is_empty() && self.blocks_placed < self.total_blocks() {
                self.refill_queue(world);
            }
            let per_block = self.tuning.ticks_per_block.max(1);
            self.work += builders;
            while self.work >= per_block {
                if !self.place_next(world) {
                    self.work = 0;
                    break;
                }
                self.work -= per_block;
            }
        } else {
            self.work = 0;
        }

        if !self.is_built && self.blocks_placed == self.total_blocks() {
            self.is_built = true;
            tracing::info!(building = %self.id, name = %self.name, owner = %self.owner, "Building completed");
        }

        if self.is_built && self.blocks_placed_percent() < self.tuning.decay_threshold {
            self.decay_ticks += 1;
            if self.decay_ticks >= self.tuning.decay_interval_ticks {
                self.decay_ticks = 0;
                if let Some(pos) = self.decay_one(world) {
                    tracing::debug!(building = %self.id, %pos, "Building decayed");
                }
            }
        } else {
            self.decay_ticks = 0;
        }
    }

    /// Reacts to a block of this building being broken. Manual breaks are
    /// counted and every `breaks_per_explosion`-th one sets off an
    /// agent-less explosion at the cell. Returns `true` if one was queued.
    pub fn on_block_break(&mut self, world: &mut ServerWorld, pos: BlockPos, manual: bool) -> bool {
        if !manual || self.tuning.breaks_per_explosion == 0 {
            return false;
        }
        self.manual_breaks += 1;
        if self.manual_breaks % self.tuning.breaks_per_explosion != 0 {
            return false;
        }
        world.queue_explosion(Explosion::environmental(
            pos.center(),
            self.tuning.assist_explosion_radius,
        ));
        tracing::debug!(building = %self.id, %pos, "Manual breaks triggered an explosion");
        true
    }

    /// Returns `true` once the building should leave the registry.
    pub fn should_be_destroyed(&self) -> bool {
        self.destroyed
            || (self.queue.is_empty() && self.blocks_placed == 0)
            || (self.is_built && self.blocks_placed_percent() <= self.min_blocks_percent)
    }

    /// Tears the building down: drops the queue, clears standing cells,
    /// releases forced chunks and queues a cosmetic agent-less explosion at
    /// the centre. Runs once.
    pub fn destroy(&mut self, world: &mut ServerWorld) {
        self.destroyed = true;
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.queue.clear();
        self.queued.clear();
        let standing: Vec<BlockPos> = self
            .cells
            .iter()
            .filter(|(p, b)| world.block(*p) == Some(*b))
            .map(|(p, _)| *p)
            .collect();
        for pos in &standing {
            let _ = world.set_block(*pos, BlockTypeId::AIR);
        }
        self.blocks_placed = 0;
        self.release_chunks(world);
        world.queue_explosion(Explosion::environmental(
            self.center(),
            self.tuning.teardown_explosion_radius,
        ));
        tracing::info!(
            building = %self.id,
            name = %self.name,
            cleared = standing.len(),
            "Building destroyed"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
