//! The server's authoritative world for one loaded level.
//!
//! Wraps the chunked [`BlockStore`], the block type registry, and a bevy_ecs
//! [`World`] holding unit entities. Units are addressed by [`UnitId`] through
//! an index so callers never handle raw ECS entities.

use bevy_ecs::prelude::*;
use bulwark_voxel::{BlockPos, BlockStore, BlockTypeId, BlockTypeRegistry, StoreError};
use glam::DVec3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::explosion::{Detonation, DetonationReport, Explosion};
use crate::unit::{BuildingId, Health, Unit, UnitId, UnitPosition, WorkerUnit};

/// Hit points of a freshly spawned unit.
const UNIT_MAX_HEALTH: f32 = 20.0;

// ---------------------------------------------------------------------------
// Dimension / TickPhase
// ---------------------------------------------------------------------------

/// Which dimension a level belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// The main surface world.
    Overworld,
    /// The underworld.
    Nether,
    /// The end dimension.
    End,
}

impl Dimension {
    /// Parses a config name such as `"overworld"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "overworld" => Some(Self::Overworld),
            "nether" => Some(Self::Nether),
            "end" => Some(Self::End),
            _ => None,
        }
    }

    /// Config name of the dimension.
    pub fn name(self) -> &'static str {
        match self {
            Self::Overworld => "overworld",
            Self::Nether => "nether",
            Self::End => "end",
        }
    }
}

/// Phase of a world tick. Hooks fire once for each phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TickPhase {
    /// Before the world advances.
    Start,
    /// After the world advanced.
    End,
}

// ---------------------------------------------------------------------------
// ServerWorld
// ---------------------------------------------------------------------------

/// Authoritative state of one loaded level.
pub struct ServerWorld {
    level_id: u64,
    dimension: Dimension,
    tick: u64,
    blocks: BlockStore,
    block_types: BlockTypeRegistry,
    entities: World,
    units: FxHashMap<UnitId, Entity>,
    next_unit_id: u32,
    pending_explosions: Vec<Explosion>,
}

impl ServerWorld {
    /// Creates an empty level. `level_id` must differ between successive loads.
    pub fn new(level_id: u64, dimension: Dimension, block_types: BlockTypeRegistry) -> Self {
        Self {
            level_id,
            dimension,
            tick: 0,
            blocks: BlockStore::new(),
            block_types,
            entities: World::new(),
            units: FxHashMap::default(),
            next_unit_id: 1,
            pending_explosions: Vec::new(),
        }
    }

    /// Identifier of this level instance.
    pub fn level_id(&self) -> u64 {
        self.level_id
    }

    /// Dimension of this level.
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Ticks completed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advances the tick counter by one.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    // --- blocks ---

    /// Block storage.
    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    /// Mutable block storage (chunk loading, forcing).
    pub fn blocks_mut(&mut self) -> &mut BlockStore {
        &mut self.blocks
    }

    /// Registry of block types used by this level.
    pub fn block_types(&self) -> &BlockTypeRegistry {
        &self.block_types
    }

    /// Block at `pos`, `None` if unloaded.
    pub fn block(&self, pos: BlockPos) -> Option<BlockTypeId> {
        self.blocks.get(pos)
    }

    /// Writes a block, returning the type it replaced.
    ///
    /// # Errors
    ///
    /// [`StoreError::ChunkNotLoaded`] if the target chunk is absent.
    pub fn set_block(&mut self, pos: BlockPos, block: BlockTypeId) -> Result<BlockTypeId, StoreError> {
        self.blocks.set(pos, block)
    }

    // --- units ---

    /// Spawns a unit at `position`. Workers additionally get a [`WorkerUnit`].
    pub fn spawn_unit(&mut self, owner: &str, position: DVec3, worker: bool) -> UnitId {
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;

        let mut entity = self.entities.spawn((
            id,
            Unit {
                id,
                owner: owner.to_string(),
            },
            Health::full(UNIT_MAX_HEALTH),
            UnitPosition(position),
        ));
        if worker {
            entity.insert(WorkerUnit::default());
        }
        let entity = entity.id();
        self.units.insert(id, entity);
        tracing::debug!(unit = id.0, owner, worker, "Spawned unit");
        id
    }

    /// Removes a unit. Returns `false` if it did not exist.
    pub fn despawn_unit(&mut self, id: UnitId) -> bool {
        match self.units.remove(&id) {
            Some(entity) => self.entities.despawn(entity),
            None => false,
        }
    }

    /// Number of live units.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Resolves a unit id to its ECS entity.
    pub fn unit_entity(&self, id: UnitId) -> Option<Entity> {
        self.units.get(&id).copied()
    }

    /// Ownership component of a unit.
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.entities.get::<Unit>(self.unit_entity(id)?)
    }

    /// Health of a unit.
    pub fn health(&self, id: UnitId) -> Option<Health> {
        self.entities.get::<Health>(self.unit_entity(id)?).copied()
    }

    /// Worker capability of a unit, `None` for non-workers.
    pub fn worker(&self, id: UnitId) -> Option<&WorkerUnit> {
        self.entities.get::<WorkerUnit>(self.unit_entity(id)?)
    }

    /// Mutable worker capability of a unit, `None` for non-workers.
    pub fn worker_mut(&mut self, id: UnitId) -> Option<Mut<'_, WorkerUnit>> {
        let entity = self.unit_entity(id)?;
        self.entities.get_mut::<WorkerUnit>(entity)
    }

    /// Number of workers whose build/repair goal targets `building`.
    pub fn builders_targeting(&self, building: BuildingId) -> usize {
        self.entities
            .iter_entities()
            .filter_map(|e| e.get::<WorkerUnit>())
            .filter(|w| w.build_repair_goal().building_target() == Some(building))
            .count()
    }

    /// Clears every worker goal pointing at `building`. Returns how many
    /// workers were released.
    pub fn release_building_target(&mut self, building: BuildingId) -> usize {
        let mut query = self.entities.query::<&mut WorkerUnit>();
        let mut released = 0;
        for mut worker in query.iter_mut(&mut self.entities) {
            if worker.build_repair_goal().building_target() == Some(building) {
                worker.build_repair_goal_mut().clear();
                released += 1;
            }
        }
        released
    }

    // --- explosions ---

    /// Queues an explosion to be detonated at the end of the current tick.
    pub fn queue_explosion(&mut self, explosion: Explosion) {
        self.pending_explosions.push(explosion);
    }

    /// Number of queued explosions.
    pub fn pending_explosion_count(&self) -> usize {
        self.pending_explosions.len()
    }

    /// Drains the explosion queue.
    pub fn take_pending_explosions(&mut self) -> Vec<Explosion> {
        std::mem::take(&mut self.pending_explosions)
    }

    /// Collects every non-air block and unit within the blast radius.
    pub fn prepare_detonation(&self, explosion: Explosion) -> Detonation {
        let affected_blocks = self
            .blocks
            .blocks_in_sphere(explosion.center, explosion.radius);

        let r_sq = explosion.radius * explosion.radius;
        let mut affected_entities: Vec<UnitId> = self
            .entities
            .iter_entities()
            .filter_map(|e| Some((*e.get::<UnitId>()?, e.get::<UnitPosition>()?.0)))
            .filter(|(_, pos)| pos.distance_squared(explosion.center) <= r_sq)
            .map(|(id, _)| id)
            .collect();
        affected_entities.sort();

        Detonation {
            explosion,
            affected_entities,
            affected_blocks,
        }
    }

    /// Applies a (possibly filtered) detonation: clears its blocks and
    /// damages its units with linear falloff. Dead units are despawned.
    pub fn apply_detonation(&mut self, detonation: &Detonation) -> DetonationReport {
        let mut report = DetonationReport::default();
        let explosion = &detonation.explosion;

        for &pos in &detonation.affected_blocks {
            if let Ok(old) = self.blocks.set(pos, BlockTypeId::AIR)
                && !old.is_air()
            {
                report.blocks_destroyed += 1;
            }
        }

        if explosion.damage > 0.0 {
            for &id in &detonation.affected_entities {
                let Some(entity) = self.unit_entity(id) else {
                    continue;
                };
                let Some(pos) = self.entities.get::<UnitPosition>(entity).map(|p| p.0) else {
                    continue;
                };
                let falloff = 1.0 - (pos.distance(explosion.center) / explosion.radius).min(1.0);
                let amount = explosion.damage * falloff as f32;
                let dead = match self.entities.get_mut::<Health>(entity) {
                    Some(mut health) => {
                        health.current -= amount;
                        health.is_dead()
                    }
                    None => false,
                };
                report.units_damaged += 1;
                if dead && self.despawn_unit(id) {
                    report.units_killed += 1;
                }
            }
        }

        tracing::debug!(
            blocks = report.blocks_destroyed,
            damaged = report.units_damaged,
            killed = report.units_killed,
            "Explosion applied"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_voxel::ChunkPos;

    fn test_world() -> ServerWorld {
        let types = BlockTypeRegistry::with_solids(["stone"]).unwrap();
        let mut world = ServerWorld::new(1, Dimension::Overworld, types);
        world.blocks_mut().load_chunk(ChunkPos::new(0, 0, 0), BlockTypeId::AIR);
        world
    }

    #[test]
    fn test_dimension_names_roundtrip() {
        for d in [Dimension::Overworld, Dimension::Nether, Dimension::End] {
            assert_eq!(Dimension::from_name(d.name()), Some(d));
        }
        assert_eq!(Dimension::from_name(" Overworld "), Some(Dimension::Overworld));
        assert_eq!(Dimension::from_name("moon"), None);
    }

    #[test]
    fn test_spawn_and_resolve_units() {
        let mut world = test_world();
        let worker = world.spawn_unit("alice", DVec3::ZERO, true);
        let soldier = world.spawn_unit("bob", DVec3::ZERO, false);

        assert_eq!(world.unit_count(), 2);
        assert_eq!(world.unit(worker).unwrap().owner, "alice");
        assert!(world.worker(worker).is_some());
        assert!(world.worker(soldier).is_none());
        assert!(world.unit(UnitId(999)).is_none());

        assert!(world.despawn_unit(soldier));
        assert!(!world.despawn_unit(soldier));
        assert_eq!(world.unit_count(), 1);
    }

    #[test]
    fn test_builders_targeting_and_release() {
        let mut world = test_world();
        let a = world.spawn_unit("alice", DVec3::ZERO, true);
        let b = world.spawn_unit("alice", DVec3::ZERO, true);
        let target = BuildingId(7);

        world.worker_mut(a).unwrap().build_repair_goal_mut().set_building_target(target);
        world.worker_mut(b).unwrap().build_repair_goal_mut().set_building_target(BuildingId(8));
        assert_eq!(world.builders_targeting(target), 1);

        assert_eq!(world.release_building_target(target), 1);
        assert_eq!(world.builders_targeting(target), 0);
        assert_eq!(world.builders_targeting(BuildingId(8)), 1);
    }

    #[test]
    fn test_detonation_collects_blocks_and_units_in_radius() {
        let mut world = test_world();
        let stone = BlockTypeId(1);
        world.set_block(BlockPos::new(4, 4, 4), stone).unwrap();
        world.set_block(BlockPos::new(20, 4, 4), stone).unwrap();
        let near = world.spawn_unit("alice", DVec3::new(4.5, 5.0, 4.5), false);
        world.spawn_unit("bob", DVec3::new(25.0, 5.0, 4.5), false);

        let det = world.prepare_detonation(Explosion::caused_by(near, DVec3::new(4.5, 4.5, 4.5), 3.0, 30.0));
        assert_eq!(det.affected_blocks, vec![BlockPos::new(4, 4, 4)]);
        assert_eq!(det.affected_entities, vec![near]);

        let report = world.apply_detonation(&det);
        assert_eq!(report.blocks_destroyed, 1);
        assert_eq!(report.units_damaged, 1);
        assert_eq!(world.block(BlockPos::new(4, 4, 4)), Some(BlockTypeId::AIR));
        assert_eq!(world.block(BlockPos::new(20, 4, 4)), Some(stone));
    }

    #[test]
    fn test_lethal_detonation_despawns_unit() {
        let mut world = test_world();
        let victim = world.spawn_unit("bob", DVec3::new(1.0, 1.0, 1.0), false);
        let det = Detonation {
            explosion: Explosion::caused_by(UnitId(99), DVec3::new(1.0, 1.0, 1.0), 4.0, 100.0),
            affected_entities: vec![victim],
            affected_blocks: Vec::new(),
        };
        let report = world.apply_detonation(&det);
        assert_eq!(report.units_killed, 1);
        assert!(world.unit(victim).is_none());
    }

    #[test]
    fn test_explosion_queue_drains() {
        let mut world = test_world();
        world.queue_explosion(Explosion::environmental(DVec3::ZERO, 1.0));
        assert_eq!(world.pending_explosion_count(), 1);
        assert_eq!(world.take_pending_explosions().len(), 1);
        assert_eq!(world.pending_explosion_count(), 0);
    }
}
