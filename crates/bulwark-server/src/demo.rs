//! A flat demo level and the scripted session played on it.

use std::cell::RefCell;

use bulwark_buildings::{BuildingServer, NotificationSink, PlacementRequest, ResourceLedger, TemplateLibrary};
use bulwark_sim::{BuildingId, Dimension, Explosion, HookBus, ServerWorld};
use bulwark_voxel::{BlockPos, BlockTypeId, BlockTypeRegistry, ChunkPos, RegistryError, Rotation};
use glam::DVec3;
use tracing::info;

/// Chunks loaded in each horizontal direction from the origin.
const DEMO_RADIUS_CHUNKS: i32 = 2;
const GROUND_BLOCK: &str = "dirt";

/// A flat level: solid ground below `y = 0`, air above.
pub fn flat_world(level_id: u64, library: &TemplateLibrary) -> Result<ServerWorld, RegistryError> {
    let mut names = library.block_names();
    names.push(GROUND_BLOCK);
    names.sort_unstable();
    names.dedup();
    let types = BlockTypeRegistry::with_solids(names)?;
    let ground = types.lookup_by_name(GROUND_BLOCK).unwrap_or(BlockTypeId::AIR);

    let mut world = ServerWorld::new(level_id, Dimension::Overworld, types);
    for x in -DEMO_RADIUS_CHUNKS..DEMO_RADIUS_CHUNKS {
        for z in -DEMO_RADIUS_CHUNKS..DEMO_RADIUS_CHUNKS {
            world.blocks_mut().load_chunk(ChunkPos::new(x, -1, z), ground);
            world.blocks_mut().load_chunk(ChunkPos::new(x, 0, z), BlockTypeId::AIR);
        }
    }
    info!(chunks = world.blocks().loaded_count(), "Demo level generated");
    Ok(world)
}

/// One player's opening: a town centre, a house and a farm, each with two
/// workers.
fn opening<L, S>(
    server: &RefCell<BuildingServer<L, S>>,
    world: &mut ServerWorld,
    owner: &str,
    base: BlockPos,
) -> Vec<BuildingId>
where
    L: ResourceLedger,
    S: NotificationSink,
{
    let plots = [
        ("town_centre", base, Rotation::None),
        ("house", base.offset(14, 0, 0), Rotation::Clockwise90),
        ("farm", base.offset(0, 0, 10), Rotation::None),
    ];
    let mut placed = Vec::new();
    for (name, origin, rotation) in plots {
        let workers = [
            world.spawn_unit(owner, origin.center(), true),
            world.spawn_unit(owner, origin.center(), true),
        ];
        let request = PlacementRequest::new(name, origin, rotation, owner).with_builders(workers);
        if let Some(id) = server.borrow_mut().place_building(world, request) {
            placed.push(id);
        }
    }
    placed
}

/// Scripted events played against the demo level. Server borrows are held
/// only around direct calls, never across a bus dispatch.
pub struct Session {
    alice: Vec<BuildingId>,
    bob: Vec<BuildingId>,
}

impl Session {
    /// Joins the demo players and places their opening buildings.
    pub fn start<L, S>(bus: &HookBus, server: &RefCell<BuildingServer<L, S>>, world: &mut ServerWorld) -> Self
    where
        L: ResourceLedger,
        S: NotificationSink,
    {
        let alice = opening(server, world, "alice", BlockPos::new(-30, 0, -30));
        bus.player_joined(world, "alice");
        let bob = opening(server, world, "bob", BlockPos::new(10, 0, 10));
        bus.player_joined(world, "bob");
        Self { alice, bob }
    }

    /// Runs whatever is scheduled for `tick`.
    pub fn on_tick<L, S>(
        &self,
        tick: u64,
        bus: &HookBus,
        server: &RefCell<BuildingServer<L, S>>,
        world: &mut ServerWorld,
    )
    where
        L: ResourceLedger,
        S: NotificationSink,
    {
        match tick {
            200 => {
                if let Some(&farm) = self.bob.last()
                    && let Some(refund) = server.borrow_mut().cancel_building(world, farm)
                {
                    info!(building = %farm, ?refund, "Bob cancelled his farm");
                }
            }
            400 => {
                bus.player_joined(world, "carol");
            }
            600 => {
                let center = self
                    .alice
                    .first()
                    .and_then(|id| server.borrow().registry().get(*id).map(|b| b.center()));
                if let (Some(&centre), Some(center)) = (self.alice.first(), center) {
                    world.queue_explosion(Explosion::environmental(center + DVec3::Y, 3.0));
                    info!(building = %centre, "Environmental blast at Alice's town centre");
                }
            }
            _ => {}
        }
    }
}
