//! The authoritative collection of live buildings for one loaded world.
//!
//! The registry drives the per-tick protocol (sync cadence, building ticks,
//! deferred removal) and answers the aggregate queries other systems ask:
//! population supply, ownership relations and tech prerequisites.
//! Collaborators (world, ledger, notification sink) are passed in per call;
//! [`BuildingServer`](crate::BuildingServer) owns them together.

use bulwark_config::BuildingsConfig;
use bulwark_sim::{BuildingId, ServerWorld, Unit, UnitId};
use bulwark_voxel::{BlockPos, Rotation};

use crate::building::{Building, BuildingTuning};
use crate::ledger::{ResourceLedger, ResourceName, Resources};
use crate::notify::{Notification, NotificationSink};
use crate::template::TemplateLibrary;

/// How a unit stands towards a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relationship {
    /// Same owner.
    Owned,
    /// Anybody else.
    Hostile,
}

/// A request to place a building.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    /// Template name.
    pub name: String,
    /// Origin cell.
    pub origin: BlockPos,
    /// Orientation.
    pub rotation: Rotation,
    /// Requesting player.
    pub owner: String,
    /// Units that should start building it.
    pub builders: Vec<UnitId>,
}

impl PlacementRequest {
    /// A request with no builders.
    pub fn new(name: impl Into<String>, origin: BlockPos, rotation: Rotation, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin,
            rotation,
            owner: owner.into(),
            builders: Vec::new(),
        }
    }

    /// Adds builder units.
    pub fn with_builders(mut self, builders: impl IntoIterator<Item = UnitId>) -> Self {
        self.builders.extend(builders);
        self
    }
}

/// Live buildings of one world, in insertion order.
#[derive(Debug)]
pub struct BuildingRegistry {
    buildings: Vec<Building>,
    library: TemplateLibrary,
    tuning: BuildingTuning,
    sync_period: u32,
    sync_countdown: u32,
    max_population: u32,
    next_id: u64,
    level_id: Option<u64>,
}

impl BuildingRegistry {
    /// Creates an empty registry.
    pub fn new(library: TemplateLibrary, config: &BuildingsConfig) -> Self {
        let sync_period = config.sync_period_ticks.max(1);
        Self {
            buildings: Vec::new(),
            library,
            tuning: BuildingTuning::from(config),
            sync_period,
            sync_countdown: sync_period,
            max_population: config.max_population,
            next_id: 1,
            level_id: None,
        }
    }

    // --- access ---

    /// Building types this registry can place.
    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }

    /// Number of live buildings.
    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    /// Returns `true` if no building is live.
    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    /// Live buildings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Building> {
        self.buildings.iter()
    }

    /// Returns `true` while `id` is registered.
    pub fn contains(&self, id: BuildingId) -> bool {
        self.get(id).is_some()
    }

    /// Building by handle.
    pub fn get(&self, id: BuildingId) -> Option<&Building> {
        self.buildings.iter().find(|b| b.id() == id)
    }

    /// Every live building that claims `pos`.
    pub fn buildings_at(&self, pos: BlockPos, include_interior: bool) -> impl Iterator<Item = &Building> {
        self.buildings
            .iter()
            .filter(move |b| b.occupies(pos, include_interior))
    }

    /// Returns `true` if any live building claims `pos`.
    pub fn is_part_of_building(&self, pos: BlockPos, include_interior: bool) -> bool {
        self.buildings_at(pos, include_interior).next().is_some()
    }

    pub(crate) fn buildings_at_mut(
        &mut self,
        pos: BlockPos,
        include_interior: bool,
    ) -> impl Iterator<Item = &mut Building> {
        self.buildings
            .iter_mut()
            .filter(move |b| b.occupies(pos, include_interior))
    }

    /// Level the registry last ticked against.
    pub fn level_id(&self) -> Option<u64> {
        self.level_id
    }

    /// Ticks left until the next sync broadcast.
    pub fn sync_countdown(&self) -> u32 {
        self.sync_countdown
    }

    // --- placement ---

    /// Places a building on behalf of `request.owner`.
    ///
    /// Invalid requests are dropped. Unaffordable ones are dropped after a
    /// warning naming which resources fell short. Otherwise the building is
    /// registered, pins its chunks, seeds its lowest layer, is announced,
    /// debits its cost and receives the requested builders. Returns the new
    /// handle when the building was registered.
    pub fn place_building<L, S>(
        &mut self,
        world: &mut ServerWorld,
        ledger: &mut L,
        sink: &mut S,
        request: PlacementRequest,
    ) -> Option<BuildingId>
    where
        L: ResourceLedger + ?Sized,
        S: NotificationSink + ?Sized,
    {
        let plan = match self.library.instantiate(
            &request.name,
            world,
            request.origin,
            request.rotation,
            &request.owner,
        ) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::debug!(owner = %request.owner, %err, "Placement discarded");
                return None;
            }
        };

        let cost = plan.cost;
        if !ledger.can_afford_all(&request.owner, cost) {
            let [food, wood, ore] =
                ResourceName::ALL.map(|r| ledger.can_afford(&request.owner, r, cost.get(r)));
            tracing::warn!(owner = %request.owner, name = %request.name, food, wood, ore, "Insufficient resources");
            sink.send_to(
                &request.owner,
                Notification::InsufficientResources {
                    owner: request.owner.clone(),
                    food,
                    wood,
                    ore,
                },
            );
            return None;
        }

        let id = BuildingId(self.next_id);
        self.next_id += 1;
        let mut building = Building::new(id, plan, self.tuning);
        building.force_chunks(world);
        let seeded = building.seed_starting_layer();
        self.buildings.push(building);

        sink.broadcast(Notification::BuildingPlaced {
            id,
            name: request.name.clone(),
            origin: request.origin,
            rotation: request.rotation,
            owner: request.owner.clone(),
            builders: request.builders.clone(),
        });
        ledger.add_subtract(&request.owner, cost.negated());

        let assigned = request
            .builders
            .iter()
            .filter(|unit| self.assign_builder(world, **unit, id))
            .count();

        tracing::info!(
            building = %id,
            name = %request.name,
            owner = %request.owner,
            origin = %request.origin,
            seeded,
            assigned,
            "Building placed"
        );
        Some(id)
    }

    /// Points a worker at a building. Returns `false` if the building is not
    /// registered or the unit does not resolve to a worker.
    pub fn assign_builder(&self, world: &mut ServerWorld, unit: UnitId, building: BuildingId) -> bool {
        if !self.contains(building) {
            tracing::debug!(unit = unit.0, %building, "Builder target is not live");
            return false;
        }
        match world.worker_mut(unit) {
            Some(mut worker) => {
                worker.build_repair_goal_mut().set_building_target(building);
                true
            }
            None => {
                tracing::debug!(unit = unit.0, "Builder is not a worker, skipped");
                false
            }
        }
    }

    /// Cancels a building: removes it from the registry first, refunds the
    /// unbuilt share of its cost, then tears it down. Returns the refund, or
    /// `None` if `id` was not registered.
    pub fn cancel_building<L, S>(
        &mut self,
        world: &mut ServerWorld,
        ledger: &mut L,
        sink: &mut S,
        id: BuildingId,
    ) -> Option<Resources>
    where
        L: ResourceLedger + ?Sized,
        S: NotificationSink + ?Sized,
    {
        let index = self.buildings.iter().position(|b| b.id() == id)?;
        let mut building = self.buildings.remove(index);

        building.recount(world);
        let refund = building.cost().refund_for(building.blocks_placed_percent());
        ledger.add_subtract(building.owner(), refund);

        building.destroy(world);
        world.release_building_target(id);
        sink.broadcast(Notification::BuildingCancelled {
            id,
            origin: building.origin(),
            refund,
        });
        tracing::info!(
            building = %id,
            owner = building.owner(),
            percent = building.blocks_placed_percent(),
            "Building cancelled"
        );
        Some(refund)
    }

    // --- queries ---

    /// Summed supply of `owner`'s built buildings, capped at the configured
    /// maximum population.
    pub fn total_population_supply(&self, owner: &str) -> u32 {
        let total: u32 = self
            .buildings
            .iter()
            .filter(|b| b.owner() == owner && b.is_built())
            .map(Building::pop_supply)
            .sum();
        total.min(self.max_population)
    }

    /// [`Relationship::Owned`] iff the unit and building share an owner.
    pub fn unit_to_building_relationship(unit: &Unit, building: &Building) -> Relationship {
        if unit.owner_name() == building.owner() {
            Relationship::Owned
        } else {
            Relationship::Hostile
        }
    }

    /// Returns `true` if `owner` has a fully built building of type `name`.
    pub fn player_has_finished_building(&self, owner: &str, name: &str) -> bool {
        self.buildings
            .iter()
            .any(|b| b.name() == name && b.is_built() && b.owner() == owner)
    }

    // --- tick ---

    /// Runs one simulation tick: sync cadence, every building's tick, then
    /// removal of buildings whose destroy condition holds. Removed buildings
    /// are torn down and their workers released. Returns their handles.
    pub fn tick<S>(&mut self, world: &mut ServerWorld, sink: &mut S) -> Vec<BuildingId>
    where
        S: NotificationSink + ?Sized,
    {
        if self.level_id != Some(world.level_id()) {
            tracing::debug!(level = world.level_id(), "Building registry bound to level");
            self.level_id = Some(world.level_id());
        }

        self.sync_countdown = self.sync_countdown.saturating_sub(1);
        if self.sync_countdown == 0 {
            self.sync_countdown = self.sync_period;
            for b in &self.buildings {
                sink.broadcast(Notification::BuildingSynced {
                    id: b.id(),
                    origin: b.origin(),
                    blocks_placed: b.blocks_placed(),
                });
            }
        }

        for b in &mut self.buildings {
            b.tick(world);
        }

        let (doomed, live): (Vec<Building>, Vec<Building>) = std::mem::take(&mut self.buildings)
            .into_iter()
            .partition(Building::should_be_destroyed);
        self.buildings = live;

        let mut removed = Vec::with_capacity(doomed.len());
        for mut b in doomed {
            b.destroy(world);
            world.release_building_target(b.id());
            sink.broadcast(Notification::BuildingDestroyed {
                id: b.id(),
                origin: b.origin(),
            });
            removed.push(b.id());
        }
        removed
    }

    /// Replays every live building to a newly joined player. Returns how
    /// many notifications were sent.
    pub fn replay_to<S>(&self, player: &str, sink: &mut S) -> usize
    where
        S: NotificationSink + ?Sized,
    {
        for b in &self.buildings {
            sink.send_to(
                player,
                Notification::BuildingReplayed {
                    id: b.id(),
                    name: b.name().to_string(),
                    origin: b.origin(),
                    rotation: b.rotation(),
                    owner: b.owner().to_string(),
                },
            );
        }
        tracing::debug!(player, count = self.buildings.len(), "Replayed buildings");
        self.buildings.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PlayerResources;
    use crate::notify::{Outbox, Recipient};
    use bulwark_sim::Dimension;
    use bulwark_voxel::{BlockTypeId, BlockTypeRegistry, ChunkPos};
    use glam::DVec3;

    struct Fixture {
        world: ServerWorld,
        registry: BuildingRegistry,
        ledger: PlayerResources,
        outbox: Outbox,
    }

    fn fixture(config: BuildingsConfig) -> Fixture {
        let library = TemplateLibrary::builtin();
        let types = BlockTypeRegistry::with_solids(library.block_names()).unwrap();
        let mut world = ServerWorld::new(1, Dimension::Overworld, types);
        for x in 0..2 {
            for z in 0..2 {
                world.blocks_mut().load_chunk(ChunkPos::new(x, 0, z), BlockTypeId::AIR);
            }
        }
        Fixture {
            world,
            registry: BuildingRegistry::new(library, &config),
            ledger: PlayerResources::new(Resources::new(1000, 1000, 1000)),
            outbox: Outbox::new(),
        }
    }

    impl Fixture {
        fn place(&mut self, name: &str, origin: BlockPos, owner: &str) -> Option<BuildingId> {
            self.registry.place_building(
                &mut self.world,
                &mut self.ledger,
                &mut self.outbox,
                PlacementRequest::new(name, origin, Rotation::None, owner),
            )
        }

        fn finish(&mut self, id: BuildingId) {
            let worker = self.world.spawn_unit("builder", DVec3::ZERO, true);
            assert!(self.registry.assign_builder(&mut self.world, worker, id));
            for _ in 0..2000 {
                self.registry.tick(&mut self.world, &mut self.outbox);
                if self.registry.get(id).is_some_and(Building::is_built) {
                    break;
                }
            }
            assert!(self.registry.get(id).unwrap().is_built());
        }
    }

    fn fast_config() -> BuildingsConfig {
        BuildingsConfig {
            ticks_per_block: 1,
            ..BuildingsConfig::default()
        }
    }

    #[test]
    fn test_place_registers_debits_and_announces() {
        let mut f = fixture(BuildingsConfig::default());
        let id = f.place("house", BlockPos::new(2, 1, 2), "alice").unwrap();

        assert_eq!(f.registry.len(), 1);
        assert_eq!(f.ledger.balance("alice"), Resources::new(1000, 925, 1000));
        let b = f.registry.get(id).unwrap();
        assert!(b.queue_len() > 0);
        assert!(b.queued_blocks().all(|p| p.y == 1));
        assert_eq!(f.world.blocks().forced_count(), 1);

        let sent = f.outbox.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, Recipient::All);
        assert!(matches!(sent[0].notification, Notification::BuildingPlaced { .. }));
    }

    #[test]
    fn test_invalid_placement_is_silent_noop() {
        let mut f = fixture(BuildingsConfig::default());
        assert!(f.place("castle", BlockPos::new(2, 1, 2), "alice").is_none());
        assert!(f.place("house", BlockPos::new(-20, 1, 2), "alice").is_none());
        assert!(f.registry.is_empty());
        assert!(f.outbox.is_empty());
        assert_eq!(f.ledger.balance("alice"), Resources::new(1000, 1000, 1000));
    }

    #[test]
    fn test_builders_resolved_individually() {
        let mut f = fixture(BuildingsConfig::default());
        let worker = f.world.spawn_unit("alice", DVec3::ZERO, true);
        let soldier = f.world.spawn_unit("alice", DVec3::ZERO, false);
        let request = PlacementRequest::new("house", BlockPos::new(2, 1, 2), Rotation::None, "alice")
            .with_builders([UnitId(404), soldier, worker]);

        let id = f
            .registry
            .place_building(&mut f.world, &mut f.ledger, &mut f.outbox, request)
            .unwrap();
        assert_eq!(f.world.builders_targeting(id), 1);
        assert_eq!(
            f.world.worker(worker).unwrap().build_repair_goal().building_target(),
            Some(id)
        );
    }

    #[test]
    fn test_assign_builder_requires_live_building() {
        let mut f = fixture(BuildingsConfig::default());
        let worker = f.world.spawn_unit("alice", DVec3::ZERO, true);
        let id = f.place("house", BlockPos::new(2, 1, 2), "alice").unwrap();
        f.registry
            .cancel_building(&mut f.world, &mut f.ledger, &mut f.outbox, id)
            .unwrap();
        assert!(!f.registry.assign_builder(&mut f.world, worker, id));
        assert_eq!(f.world.builders_targeting(id), 0);
    }

    #[test]
    fn test_cancel_unbuilt_refunds_everything() {
        let mut f = fixture(BuildingsConfig::default());
        let worker = f.world.spawn_unit("alice", DVec3::ZERO, true);
        let request = PlacementRequest::new("house", BlockPos::new(2, 1, 2), Rotation::None, "alice")
            .with_builders([worker]);
        let id = f
            .registry
            .place_building(&mut f.world, &mut f.ledger, &mut f.outbox, request)
            .unwrap();

        let refund = f
            .registry
            .cancel_building(&mut f.world, &mut f.ledger, &mut f.outbox, id)
            .unwrap();
        assert_eq!(refund, Resources::new(0, 75, 0));
        assert!(!f.registry.contains(id));
        assert_eq!(f.ledger.balance("alice"), Resources::new(1000, 1000, 1000));
        assert_eq!(f.world.builders_targeting(id), 0, "worker released");
        assert_eq!(f.world.blocks().forced_count(), 0);
        assert_eq!(f.world.pending_explosion_count(), 1);

        // Cancelling again does nothing.
        assert!(
            f.registry
                .cancel_building(&mut f.world, &mut f.ledger, &mut f.outbox, id)
                .is_none()
        );
    }

    #[test]
    fn test_population_supply_counts_built_only_and_caps() {
        let mut f = fixture(BuildingsConfig {
            max_population: 15,
            ..fast_config()
        });
        let a = f.place("house", BlockPos::new(2, 1, 2), "alice").unwrap();
        f.place("house", BlockPos::new(10, 1, 2), "alice").unwrap();
        assert_eq!(f.registry.total_population_supply("alice"), 0);

        f.finish(a);
        assert_eq!(f.registry.total_population_supply("alice"), 10);
        let b = f.registry.iter().nth(1).unwrap().id();
        f.finish(b);
        assert_eq!(f.registry.total_population_supply("alice"), 15);
        assert_eq!(f.registry.total_population_supply("bob"), 0);
    }

    #[test]
    fn test_player_has_finished_building() {
        let mut f = fixture(fast_config());
        let id = f.place("barracks", BlockPos::new(2, 1, 2), "alice").unwrap();
        assert!(!f.registry.player_has_finished_building("alice", "barracks"));
        f.finish(id);
        assert!(f.registry.player_has_finished_building("alice", "barracks"));
        assert!(!f.registry.player_has_finished_building("bob", "barracks"));
        assert!(!f.registry.player_has_finished_building("alice", "house"));
    }

    #[test]
    fn test_relationship_is_owner_equality() {
        let mut f = fixture(BuildingsConfig::default());
        let id = f.place("farm", BlockPos::new(2, 1, 2), "alice").unwrap();
        let mine = f.world.spawn_unit("alice", DVec3::ZERO, false);
        let theirs = f.world.spawn_unit("bob", DVec3::ZERO, false);
        let b = f.registry.get(id).unwrap();

        let rel = |u| BuildingRegistry::unit_to_building_relationship(f.world.unit(u).unwrap(), b);
        assert_eq!(rel(mine), Relationship::Owned);
        assert_eq!(rel(theirs), Relationship::Hostile);
    }

    #[test]
    fn test_sync_fires_every_period() {
        let mut f = fixture(BuildingsConfig {
            sync_period_ticks: 3,
            ..BuildingsConfig::default()
        });
        f.place("house", BlockPos::new(2, 1, 2), "alice").unwrap();
        f.place("farm", BlockPos::new(12, 1, 2), "bob").unwrap();
        f.outbox.drain();

        let mut syncs_per_tick = Vec::new();
        for _ in 0..6 {
            f.registry.tick(&mut f.world, &mut f.outbox);
            let n = f
                .outbox
                .drain()
                .iter()
                .filter(|e| matches!(e.notification, Notification::BuildingSynced { .. }))
                .count();
            syncs_per_tick.push(n);
        }
        assert_eq!(syncs_per_tick, vec![0, 0, 2, 0, 0, 2]);
        assert_eq!(f.registry.level_id(), Some(1));
    }

    #[test]
    fn test_doomed_building_is_ticked_then_removed() {
        let mut f = fixture(fast_config());
        let id = f.place("farm", BlockPos::new(2, 1, 2), "alice").unwrap();
        f.finish(id);
        f.world.release_building_target(id);
        f.outbox.drain();

        // Leave 2 of 25 cells standing: 0.08 is under the farm's 0.1 floor,
        // but only a tick's recount can notice.
        let cells: Vec<BlockPos> = f.registry.get(id).unwrap().cells().iter().map(|(p, _)| *p).collect();
        for p in &cells[2..] {
            f.world.set_block(*p, BlockTypeId::AIR).unwrap();
        }
        assert!(!f.registry.get(id).unwrap().should_be_destroyed());

        let removed = f.registry.tick(&mut f.world, &mut f.outbox);
        assert_eq!(removed, vec![id]);
        assert!(!f.registry.contains(id));
        assert!(cells.iter().all(|p| f.world.block(*p) == Some(BlockTypeId::AIR)));
        assert!(f.outbox.drain().iter().any(|e| matches!(
            e.notification,
            Notification::BuildingDestroyed { id: gone, .. } if gone == id
        )));

        // Gone before the next tick starts.
        assert!(f.registry.tick(&mut f.world, &mut f.outbox).is_empty());
    }

    #[test]
    fn test_replay_sends_one_notification_per_building() {
        let mut f = fixture(BuildingsConfig::default());
        f.place("house", BlockPos::new(2, 1, 2), "alice").unwrap();
        f.place("farm", BlockPos::new(12, 1, 2), "bob").unwrap();
        f.outbox.drain();

        assert_eq!(f.registry.replay_to("carol", &mut f.outbox), 2);
        let sent = f.outbox.drain();
        assert!(sent.iter().all(|e| e.recipient == Recipient::Player("carol".into())));
        assert!(
            sent.iter()
                .all(|e| matches!(e.notification, Notification::BuildingReplayed { .. }))
        );
    }
}
