//! Reconciles destructive world events against building footprints.
//!
//! Explosions may only ever remove blocks that some registered building
//! claims, and agent-less blasts (nobody exploded, no creature caused it)
//! hurt no entities at all. Manual block breaks on a building are forwarded
//! to that building so it can escalate the damage.

use bulwark_sim::{Detonation, Explosion, ServerWorld, UnitId};
use bulwark_voxel::BlockPos;

use crate::registry::BuildingRegistry;

/// Stateless arbitration rules.
pub struct WorldEventArbiter;

impl WorldEventArbiter {
    /// Forwards a player's block break to every building that claims the
    /// cell, interior included. Returns how many buildings were notified.
    pub fn on_manual_block_break(
        registry: &mut BuildingRegistry,
        world: &mut ServerWorld,
        pos: BlockPos,
    ) -> usize {
        let mut notified = 0;
        for building in registry.buildings_at_mut(pos, true) {
            building.on_block_break(world, pos, true);
            notified += 1;
        }
        notified
    }

    /// Filters the sets an explosion would affect. Blocks outside every
    /// building footprint are dropped; for agent-less explosions the entity
    /// set is cleared as well.
    pub fn on_explosion_detonate(
        registry: &BuildingRegistry,
        explosion: &Explosion,
        affected_entities: &mut Vec<UnitId>,
        affected_blocks: &mut Vec<BlockPos>,
    ) {
        if explosion.is_agentless() {
            affected_entities.clear();
        }
        let before = affected_blocks.len();
        affected_blocks.retain(|pos| registry.is_part_of_building(*pos, true));
        tracing::trace!(
            agentless = explosion.is_agentless(),
            kept = affected_blocks.len(),
            dropped = before - affected_blocks.len(),
            "Explosion filtered"
        );
    }

    /// [`on_explosion_detonate`](Self::on_explosion_detonate) over a
    /// detonation payload.
    pub fn filter_detonation(registry: &BuildingRegistry, detonation: &mut Detonation) {
        let Detonation {
            explosion,
            affected_entities,
            affected_blocks,
        } = detonation;
        Self::on_explosion_detonate(registry, explosion, affected_entities, affected_blocks);
    }
}
