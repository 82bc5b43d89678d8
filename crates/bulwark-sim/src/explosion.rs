//! Explosion descriptors and the mutable detonation payload handed to hooks.
//!
//! A detonation runs in three steps: the world collects what the blast would
//! touch ([`ServerWorld::prepare_detonation`](crate::ServerWorld::prepare_detonation)),
//! hooks may shrink the affected sets, then the world applies what is left
//! ([`ServerWorld::apply_detonation`](crate::ServerWorld::apply_detonation)).

use bulwark_voxel::BlockPos;
use glam::DVec3;

use crate::unit::UnitId;

/// One blast.
#[derive(Clone, Debug, PartialEq)]
pub struct Explosion {
    /// Blast centre.
    pub center: DVec3,
    /// Blocks and units within this distance are affected.
    pub radius: f64,
    /// Damage dealt at the centre; falls off linearly to zero at `radius`.
    pub damage: f32,
    /// The entity that physically exploded (e.g. a thrown charge), if any.
    pub exploder: Option<UnitId>,
    /// The creature responsible for the blast, if any.
    pub source_mob: Option<UnitId>,
}

impl Explosion {
    /// A blast with no exploder and no source creature, such as a collapsing
    /// structure or a bed going off.
    pub fn environmental(center: DVec3, radius: f64) -> Self {
        Self {
            center,
            radius,
            damage: 0.0,
            exploder: None,
            source_mob: None,
        }
    }

    /// A blast caused by a unit.
    pub fn caused_by(source: UnitId, center: DVec3, radius: f64, damage: f32) -> Self {
        Self {
            center,
            radius,
            damage,
            exploder: None,
            source_mob: Some(source),
        }
    }

    /// Returns `true` if no agent is attached to the blast.
    pub fn is_agentless(&self) -> bool {
        self.exploder.is_none() && self.source_mob.is_none()
    }
}

/// The mutable event payload: hooks may remove entries from either set.
#[derive(Clone, Debug, PartialEq)]
pub struct Detonation {
    /// The blast being resolved.
    pub explosion: Explosion,
    /// Units that would take damage.
    pub affected_entities: Vec<UnitId>,
    /// Non-air blocks that would be destroyed.
    pub affected_blocks: Vec<BlockPos>,
}

/// What a detonation actually did after hooks ran.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetonationReport {
    /// Blocks cleared to air.
    pub blocks_destroyed: usize,
    /// Units that took damage.
    pub units_damaged: usize,
    /// Units removed because their health ran out.
    pub units_killed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environmental_is_agentless() {
        let e = Explosion::environmental(DVec3::ZERO, 2.0);
        assert!(e.is_agentless());
        assert_eq!(e.damage, 0.0);
    }

    #[test]
    fn test_either_agent_field_counts() {
        let mut e = Explosion::environmental(DVec3::ZERO, 2.0);
        e.exploder = Some(UnitId(1));
        assert!(!e.is_agentless());

        let caused = Explosion::caused_by(UnitId(2), DVec3::ZERO, 3.0, 10.0);
        assert!(!caused.is_agentless());
        assert_eq!(caused.source_mob, Some(UnitId(2)));
    }
}
