//! Server event hooks and the bus that dispatches them.
//!
//! Subsystems implement [`ServerHooks`] and are subscribed to a [`HookBus`]
//! at startup. The bus drives the per-tick protocol and resolves world
//! events (block breaks, explosions) so that hooks run *before* the world is
//! mutated. Dispatch order between subscribers is unspecified.

use std::cell::RefCell;
use std::rc::Rc;

use bulwark_voxel::{BlockPos, BlockTypeId};

use crate::explosion::{DetonationReport, Explosion};
use crate::world::{ServerWorld, TickPhase};
use crate::Detonation;

/// Callbacks a subsystem can subscribe to. Every method defaults to a no-op.
pub trait ServerHooks {
    /// Fired twice per tick, once per [`TickPhase`].
    fn on_world_tick(&mut self, _world: &mut ServerWorld, _phase: TickPhase) {}

    /// Fired when a player connects.
    fn on_player_join(&mut self, _world: &ServerWorld, _player: &str) {}

    /// Fired when a player breaks a block, before the block is cleared.
    fn on_block_break(&mut self, _world: &mut ServerWorld, _pos: BlockPos) {}

    /// Fired when an explosion goes off, before it is applied. Hooks may
    /// remove entries from the affected sets.
    fn on_explosion(&mut self, _world: &ServerWorld, _detonation: &mut Detonation) {}
}

/// A subscriber shared between the bus and its owner.
pub type SharedHooks = Rc<RefCell<dyn ServerHooks>>;

/// Ordered list of subscribers.
#[derive(Default)]
pub struct HookBus {
    subscribers: Vec<SharedHooks>,
}

impl HookBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber.
    pub fn subscribe(&mut self, hooks: SharedHooks) {
        self.subscribers.push(hooks);
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns `true` if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Fires `on_world_tick` for one phase.
    pub fn world_tick(&self, world: &mut ServerWorld, phase: TickPhase) {
        for hooks in &self.subscribers {
            hooks.borrow_mut().on_world_tick(world, phase);
        }
    }

    /// Runs one full tick: start phase, end phase, queued explosions, then
    /// advances the world's tick counter.
    pub fn run_tick(&self, world: &mut ServerWorld) {
        self.world_tick(world, TickPhase::Start);
        self.world_tick(world, TickPhase::End);
        self.flush_explosions(world);
        world.advance_tick();
    }

    /// Fires `on_player_join`.
    pub fn player_joined(&self, world: &ServerWorld, player: &str) {
        tracing::info!(player, "Player joined");
        for hooks in &self.subscribers {
            hooks.borrow_mut().on_player_join(world, player);
        }
    }

    /// Breaks a block on behalf of a player: hooks first, then the cell is
    /// cleared. Returns `false` (and fires nothing) for air or unloaded cells.
    pub fn break_block(&self, world: &mut ServerWorld, pos: BlockPos) -> bool {
        match world.block(pos) {
            Some(block) if !block.is_air() => {}
            _ => return false,
        }
        for hooks in &self.subscribers {
            hooks.borrow_mut().on_block_break(world, pos);
        }
        world.set_block(pos, BlockTypeId::AIR).is_ok()
    }

    /// Resolves an explosion: collect, let hooks filter, apply.
    pub fn detonate(&self, world: &mut ServerWorld, explosion: Explosion) -> DetonationReport {
        let mut detonation = world.prepare_detonation(explosion);
        for hooks in &self.subscribers {
            hooks.borrow_mut().on_explosion(world, &mut detonation);
        }
        world.apply_detonation(&detonation)
    }

    /// Detonates everything queued on the world. Explosions queued while
    /// flushing wait for the next flush. Returns how many went off.
    pub fn flush_explosions(&self, world: &mut ServerWorld) -> usize {
        let pending = world.take_pending_explosions();
        let count = pending.len();
        for explosion in pending {
            self.detonate(world, explosion);
        }
        count
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
