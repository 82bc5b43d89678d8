//! Per-world context object tying the registry to its collaborators and to
//! the server's event hooks.

use bulwark_config::Config;
use bulwark_sim::{BuildingId, Detonation, Dimension, ServerHooks, ServerWorld, TickPhase, UnitId};
use bulwark_voxel::BlockPos;

use crate::arbiter::WorldEventArbiter;
use crate::ledger::{ResourceLedger, Resources};
use crate::notify::NotificationSink;
use crate::registry::{BuildingRegistry, PlacementRequest};
use crate::template::TemplateLibrary;

/// Building subsystem state for one loaded world. Create it when the world
/// loads, subscribe it to the hook bus, and drop it when the world unloads.
pub struct BuildingServer<L, S> {
    registry: BuildingRegistry,
    ledger: L,
    sink: S,
    authoritative: Dimension,
}

impl<L: ResourceLedger, S: NotificationSink> BuildingServer<L, S> {
    /// Creates the context from config.
    pub fn new(config: &Config, library: TemplateLibrary, ledger: L, sink: S) -> Self {
        let name = &config.server.authoritative_dimension;
        let authoritative = Dimension::from_name(name).unwrap_or_else(|| {
            tracing::warn!(dimension = %name, "Unknown authoritative dimension, using overworld");
            Dimension::Overworld
        });
        Self {
            registry: BuildingRegistry::new(library, &config.buildings),
            ledger,
            sink,
            authoritative,
        }
    }

    /// Live buildings.
    pub fn registry(&self) -> &BuildingRegistry {
        &self.registry
    }

    /// Resource ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable resource ledger.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Notification sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable notification sink, e.g. to drain an outbox.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The only dimension whose ticks drive buildings.
    pub fn authoritative_dimension(&self) -> Dimension {
        self.authoritative
    }

    /// See [`BuildingRegistry::place_building`].
    pub fn place_building(&mut self, world: &mut ServerWorld, request: PlacementRequest) -> Option<BuildingId> {
        self.registry
            .place_building(world, &mut self.ledger, &mut self.sink, request)
    }

    /// See [`BuildingRegistry::cancel_building`].
    pub fn cancel_building(&mut self, world: &mut ServerWorld, id: BuildingId) -> Option<Resources> {
        self.registry
            .cancel_building(world, &mut self.ledger, &mut self.sink, id)
    }

    /// See [`BuildingRegistry::assign_builder`].
    pub fn assign_builder(&self, world: &mut ServerWorld, unit: UnitId, building: BuildingId) -> bool {
        self.registry.assign_builder(world, unit, building)
    }

    /// Returns `true` if this tick event should drive the registry.
    pub fn is_authoritative_tick(&self, world: &ServerWorld, phase: TickPhase) -> bool {
        phase == TickPhase::End && world.dimension() == self.authoritative
    }
}

impl<L: ResourceLedger, S: NotificationSink> ServerHooks for BuildingServer<L, S> {
    fn on_world_tick(&mut self, world: &mut ServerWorld, phase: TickPhase) {
        if !self.is_authoritative_tick(world, phase) {
            return;
        }
        self.registry.tick(world, &mut self.sink);
    }

    fn on_player_join(&mut self, _world: &ServerWorld, player: &str) {
        self.registry.replay_to(player, &mut self.sink);
    }

    fn on_block_break(&mut self, world: &mut ServerWorld, pos: BlockPos) {
        WorldEventArbiter::on_manual_block_break(&mut self.registry, world, pos);
    }

    fn on_explosion(&mut self, _world: &ServerWorld, detonation: &mut Detonation) {
        WorldEventArbiter::filter_detonation(&self.registry, detonation);
    }
}
