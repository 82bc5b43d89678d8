//! Unit entity components.
//!
//! Units live in the bevy_ecs [`World`](bevy_ecs::world::World) inside
//! [`ServerWorld`](crate::ServerWorld). Only the parts other subsystems
//! consume are modelled here: ownership, health, position, and the worker
//! build/repair goal.

use bevy_ecs::prelude::*;
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Server-assigned unit identifier, stable for the unit's lifetime.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

/// Handle to a registered building. Allocated by the building registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildingId(pub u64);

impl std::fmt::Display for BuildingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "building#{}", self.0)
    }
}

/// Ownership of a unit.
#[derive(Component, Clone, Debug, PartialEq, Eq)]
pub struct Unit {
    /// Identifier of the unit.
    pub id: UnitId,
    /// Name of the owning player.
    pub owner: String,
}

impl Unit {
    /// Owner name.
    pub fn owner_name(&self) -> &str {
        &self.owner
    }
}

/// Hit points.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Health {
    /// Remaining hit points.
    pub current: f32,
    /// Maximum hit points.
    pub max: f32,
}

impl Health {
    /// Full health with the given maximum.
    pub fn full(max: f32) -> Self {
        Self { current: max, max }
    }

    /// Returns `true` once hit points are exhausted.
    pub fn is_dead(&self) -> bool {
        self.current <= 0.0
    }
}

/// Continuous world position.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct UnitPosition(pub DVec3);

/// What a worker is currently building or repairing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildRepairGoal {
    target: Option<BuildingId>,
}

impl BuildRepairGoal {
    /// Points the worker at a building.
    pub fn set_building_target(&mut self, building: BuildingId) {
        self.target = Some(building);
    }

    /// The building currently targeted, if any.
    pub fn building_target(&self) -> Option<BuildingId> {
        self.target
    }

    /// Drops the current target.
    pub fn clear(&mut self) {
        self.target = None;
    }
}

/// Marks a unit as able to build and repair.
#[derive(Component, Clone, Debug, Default, PartialEq)]
pub struct WorkerUnit {
    build_repair_goal: BuildRepairGoal,
}

impl WorkerUnit {
    /// Read access to the build/repair goal.
    pub fn build_repair_goal(&self) -> &BuildRepairGoal {
        &self.build_repair_goal
    }

    /// Mutable access to the build/repair goal.
    pub fn build_repair_goal_mut(&mut self) -> &mut BuildRepairGoal {
        &mut self.build_repair_goal
    }
}
