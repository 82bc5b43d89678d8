//! Per-owner resource balances.
//!
//! The building subsystem only consumes the [`ResourceLedger`] trait;
//! [`PlayerResources`] is the in-memory implementation the server runs with.

use bulwark_config::ResourcesConfig;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// The three resource types a building can cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceName {
    /// Food.
    Food,
    /// Wood.
    Wood,
    /// Ore.
    Ore,
}

impl ResourceName {
    /// Every resource type, in wire order.
    pub const ALL: [ResourceName; 3] = [ResourceName::Food, ResourceName::Wood, ResourceName::Ore];

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            ResourceName::Food => "food",
            ResourceName::Wood => "wood",
            ResourceName::Ore => "ore",
        }
    }
}

/// An amount of each resource. Used both as a balance and as a signed delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resources {
    /// Food amount.
    pub food: i32,
    /// Wood amount.
    pub wood: i32,
    /// Ore amount.
    pub ore: i32,
}

impl Resources {
    /// Creates a resource vector.
    pub const fn new(food: i32, wood: i32, ore: i32) -> Self {
        Self { food, wood, ore }
    }

    /// Amount of one resource.
    pub fn get(&self, resource: ResourceName) -> i32 {
        match resource {
            ResourceName::Food => self.food,
            ResourceName::Wood => self.wood,
            ResourceName::Ore => self.ore,
        }
    }

    /// The same amounts with the sign flipped, turning a cost into a debit.
    pub fn negated(self) -> Self {
        Self::new(-self.food, -self.wood, -self.ore)
    }

    /// Share of a cost returned when `built_fraction` of it was already
    /// spent on construction. Each resource is rounded to the nearest
    /// integer, halves away from zero.
    pub fn refund_for(self, built_fraction: f32) -> Self {
        let remaining = 1.0 - built_fraction.clamp(0.0, 1.0);
        let share = |amount: i32| (amount as f32 * remaining).round() as i32;
        Self::new(share(self.food), share(self.wood), share(self.ore))
    }

    /// Component-wise sum.
    pub fn plus(self, other: Resources) -> Self {
        Self::new(
            self.food + other.food,
            self.wood + other.wood,
            self.ore + other.ore,
        )
    }
}

impl From<&ResourcesConfig> for Resources {
    fn from(config: &ResourcesConfig) -> Self {
        Self::new(config.food, config.wood, config.ore)
    }
}

/// Service the building subsystem charges and refunds through.
pub trait ResourceLedger {
    /// Returns `true` if `owner` holds at least `amount` of `resource`.
    fn can_afford(&self, owner: &str, resource: ResourceName, amount: i32) -> bool;

    /// Applies a signed delta to `owner`'s balances. Negative entries debit.
    fn add_subtract(&mut self, owner: &str, delta: Resources);

    /// Returns `true` if every entry of `cost` is affordable.
    fn can_afford_all(&self, owner: &str, cost: Resources) -> bool {
        ResourceName::ALL
            .iter()
            .all(|&r| self.can_afford(owner, r, cost.get(r)))
    }
}

/// In-memory ledger. Owners it has never seen start with the configured
/// balances.
#[derive(Debug, Clone, Default)]
pub struct PlayerResources {
    starting: Resources,
    balances: FxHashMap<String, Resources>,
}

impl PlayerResources {
    /// Creates a ledger that seeds new owners with `starting`.
    pub fn new(starting: Resources) -> Self {
        Self {
            starting,
            balances: FxHashMap::default(),
        }
    }

    /// Creates a ledger seeded from config.
    pub fn from_config(config: &ResourcesConfig) -> Self {
        Self::new(Resources::from(config))
    }

    /// Current balances of `owner`.
    pub fn balance(&self, owner: &str) -> Resources {
        self.balances.get(owner).copied().unwrap_or(self.starting)
    }

    /// Overwrites `owner`'s balances.
    pub fn set_balance(&mut self, owner: &str, balance: Resources) {
        self.balances.insert(owner.to_string(), balance);
    }
}

impl ResourceLedger for PlayerResources {
    fn can_afford(&self, owner: &str, resource: ResourceName, amount: i32) -> bool {
        self.balance(owner).get(resource) >= amount
    }

    fn add_subtract(&mut self, owner: &str, delta: Resources) {
        let updated = self.balance(owner).plus(delta);
        self.balances.insert(owner.to_string(), updated);
        tracing::debug!(
            owner,
            food = updated.food,
            wood = updated.wood,
            ore = updated.ore,
            "Resources updated"
        );
    }
}
