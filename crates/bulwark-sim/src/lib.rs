//! Server-side simulation host: the authoritative world a building subsystem
//! runs against, unit entities, explosions, event hooks, and tick pacing.
//!
//! The host owns one [`ServerWorld`] per loaded level and fires
//! [`ServerHooks`] through a [`HookBus`] in a fixed order every tick.

pub mod explosion;
pub mod hooks;
pub mod schedule;
pub mod unit;
pub mod world;

pub use explosion::{Detonation, DetonationReport, Explosion};
pub use hooks::{HookBus, ServerHooks, SharedHooks};
pub use schedule::{DEFAULT_TICK_RATE, ServerTickSchedule};
pub use unit::{BuildRepairGoal, BuildingId, Health, Unit, UnitId, UnitPosition, WorkerUnit};
pub use world::{Dimension, ServerWorld, TickPhase};
