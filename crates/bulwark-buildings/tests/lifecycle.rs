//! End-to-end building lifecycle through the server hook bus.

use std::cell::RefCell;
use std::rc::Rc;

use bulwark_buildings::{
    BuildingServer, Notification, Outbox, PlacementRequest, PlayerResources, Recipient, Resources,
    TemplateLibrary,
};
use bulwark_config::Config;
use bulwark_sim::{
    BuildingId, Detonation, Dimension, Explosion, HookBus, ServerHooks, ServerWorld, SharedHooks,
    UnitId,
};
use bulwark_voxel::{BlockPos, BlockTypeId, BlockTypeRegistry, ChunkPos, Rotation};
use glam::DVec3;

type Server = BuildingServer<PlayerResources, Outbox>;

struct Harness {
    world: ServerWorld,
    bus: HookBus,
    server: Rc<RefCell<Server>>,
    stone: BlockTypeId,
}

impl Harness {
    fn new(config: Config) -> Self {
        let library = TemplateLibrary::builtin();
        let mut names = library.block_names();
        names.push("stone");
        let types = BlockTypeRegistry::with_solids(names).unwrap();
        let stone = types.lookup_by_name("stone").unwrap();

        let mut world = ServerWorld::new(1, Dimension::Overworld, types);
        for x in 0..2 {
            for z in 0..2 {
                world.blocks_mut().load_chunk(ChunkPos::new(x, 0, z), BlockTypeId::AIR);
            }
        }

        let ledger = PlayerResources::from_config(&config.resources);
        let server = Rc::new(RefCell::new(BuildingServer::new(
            &config,
            library,
            ledger,
            Outbox::new(),
        )));
        let mut bus = HookBus::new();
        bus.subscribe(server.clone() as SharedHooks);

        Self {
            world,
            bus,
            server,
            stone,
        }
    }

    fn fast() -> Self {
        let mut config = Config::default();
        config.buildings.ticks_per_block = 1;
        config.resources.wood = 10_000;
        config.resources.ore = 10_000;
        Self::new(config)
    }

    fn place(&mut self, name: &str, origin: BlockPos, owner: &str, builders: &[UnitId]) -> Option<BuildingId> {
        let request = PlacementRequest::new(name, origin, Rotation::None, owner)
            .with_builders(builders.iter().copied());
        self.server.borrow_mut().place_building(&mut self.world, request)
    }

    fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.bus.run_tick(&mut self.world);
        }
    }

    fn build(&mut self, name: &str, origin: BlockPos, owner: &str) -> BuildingId {
        let worker = self.world.spawn_unit(owner, DVec3::ZERO, true);
        let id = self.place(name, origin, owner, &[worker]).unwrap();
        for _ in 0..2000 {
            self.run(1);
            if self.server.borrow().registry().get(id).is_some_and(|b| b.is_built()) {
                break;
            }
        }
        self.world.release_building_target(id);
        id
    }

    fn drain(&mut self) -> Vec<bulwark_buildings::Envelope> {
        self.server.borrow_mut().sink_mut().drain()
    }
}

#[test]
fn test_unaffordable_placement_changes_nothing_and_warns_once() {
    let mut config = Config::default();
    config.resources = bulwark_config::ResourcesConfig {
        food: 0,
        wood: 10,
        ore: 0,
    };
    let mut h = Harness::new(config);

    assert!(h.place("blacksmith", BlockPos::new(2, 1, 2), "alice", &[]).is_none());

    let server = h.server.borrow();
    assert!(server.registry().is_empty());
    assert_eq!(server.ledger().balance("alice"), Resources::new(0, 10, 0));
    assert_eq!(h.world.blocks().forced_count(), 0);
    let sent = server.sink().pending();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, Recipient::Player("alice".into()));
    assert_eq!(
        sent[0].notification,
        Notification::InsufficientResources {
            owner: "alice".into(),
            food: true,
            wood: false,
            ore: false,
        }
    );
}

#[test]
fn test_cancel_refunds_unbuilt_share() {
    let mut h = Harness::fast();
    let worker = h.world.spawn_unit("alice", DVec3::ZERO, true);
    let id = h
        .place("town_centre", BlockPos::new(2, 1, 2), "alice", &[worker])
        .unwrap();
    let after_debit = h.server.borrow().ledger().balance("alice");

    // One worker places one of the 168 cells per tick.
    h.run(42);
    let percent = h.server.borrow().registry().get(id).unwrap().blocks_placed_percent();
    assert_eq!(percent, 0.25);

    let refund = h.server.borrow_mut().cancel_building(&mut h.world, id).unwrap();
    assert_eq!(refund, Resources::new(0, 225, 75));

    let server = h.server.borrow();
    assert!(!server.registry().contains(id));
    assert_eq!(server.ledger().balance("alice"), after_debit.plus(refund));
    assert_eq!(h.world.builders_targeting(id), 0);
}

#[test]
fn test_population_is_capped() {
    let mut config = Config::default();
    config.buildings.ticks_per_block = 1;
    config.buildings.max_population = 25;
    config.resources.wood = 10_000;
    let mut h = Harness::new(config);

    for x in [2, 10, 18] {
        h.build("house", BlockPos::new(x, 1, 2), "alice");
    }
    let server = h.server.borrow();
    assert_eq!(server.registry().len(), 3);
    assert!(server.registry().iter().all(|b| b.is_built()));
    assert_eq!(server.registry().total_population_supply("alice"), 25);
}

#[test]
fn test_explosion_filtering_agentless_and_agent_caused() {
    let mut h = Harness::fast();
    h.place("house", BlockPos::new(4, 1, 4), "alice", &[]).unwrap();

    let inside = vec![BlockPos::new(4, 1, 4), BlockPos::new(5, 2, 4), BlockPos::new(6, 2, 6)];
    let mut blocks = inside.clone();
    blocks.insert(1, BlockPos::new(3, 1, 4));
    blocks.push(BlockPos::new(9, 1, 4));

    let mut agentless = Detonation {
        explosion: Explosion::environmental(DVec3::new(5.0, 2.0, 5.0), 5.0),
        affected_entities: vec![UnitId(1), UnitId(2)],
        affected_blocks: blocks.clone(),
    };
    h.server.borrow_mut().on_explosion(&h.world, &mut agentless);
    assert!(agentless.affected_entities.is_empty());
    assert_eq!(agentless.affected_blocks, inside);

    let mut caused = Detonation {
        explosion: Explosion::caused_by(UnitId(3), DVec3::new(5.0, 2.0, 5.0), 5.0, 8.0),
        affected_entities: vec![UnitId(1), UnitId(2)],
        affected_blocks: blocks,
    };
    h.server.borrow_mut().on_explosion(&h.world, &mut caused);
    assert_eq!(caused.affected_entities, vec![UnitId(1), UnitId(2)]);
    assert_eq!(caused.affected_blocks, inside);
}

#[test]
fn test_detonation_spares_terrain_and_units() {
    let mut h = Harness::fast();
    let id = h.build("house", BlockPos::new(4, 1, 4), "alice");
    let pillar = BlockPos::new(3, 1, 4);
    h.world.set_block(pillar, h.stone).unwrap();
    let bystander = h.world.spawn_unit("bob", DVec3::new(3.5, 1.5, 4.5), false);

    let report = h
        .bus
        .detonate(&mut h.world, Explosion::environmental(DVec3::new(4.5, 1.5, 4.5), 2.0));

    assert!(report.blocks_destroyed > 0);
    assert_eq!(report.units_damaged, 0);
    assert_eq!(h.world.block(pillar), Some(h.stone));
    assert_eq!(h.world.block(BlockPos::new(4, 1, 4)), Some(BlockTypeId::AIR));
    assert!(h.world.unit(bystander).is_some());
    assert!(h.server.borrow().registry().contains(id));
}

#[test]
fn test_repeated_manual_breaks_escalate() {
    let mut h = Harness::fast();
    let id = h.build("house", BlockPos::new(4, 1, 4), "alice");
    let total = h.server.borrow().registry().get(id).unwrap().total_blocks();

    // The front wall row at y = 2, minus the doorway.
    let targets = [
        BlockPos::new(4, 2, 4),
        BlockPos::new(5, 2, 4),
        BlockPos::new(7, 2, 4),
        BlockPos::new(8, 2, 4),
        BlockPos::new(8, 2, 5),
    ];
    for pos in targets {
        assert!(h.bus.break_block(&mut h.world, pos));
    }
    assert_eq!(h.world.pending_explosion_count(), 1);

    // The blast goes off at the end of the first tick; the second recounts.
    h.run(2);
    let placed = h.server.borrow().registry().get(id).unwrap().blocks_placed();
    assert!(placed < total - targets.len() as u32, "explosion took more than the broken cells");
}

#[test]
fn test_destroyed_building_leaves_registry_on_next_tick() {
    let mut h = Harness::fast();
    let id = h.build("farm", BlockPos::new(2, 1, 2), "alice");
    h.drain();

    for x in 2..7 {
        for z in 2..7 {
            h.world.set_block(BlockPos::new(x, 1, z), BlockTypeId::AIR).unwrap();
        }
    }
    assert!(h.server.borrow().registry().contains(id));

    h.run(1);
    assert!(!h.server.borrow().registry().contains(id));
    let sent = h.drain();
    assert!(sent.iter().any(|e| matches!(
        e.notification,
        Notification::BuildingDestroyed { id: gone, .. } if gone == id
    )));
    assert_eq!(h.world.blocks().forced_count(), 0);
}

#[test]
fn test_late_joiner_gets_every_building_replayed() {
    let mut h = Harness::fast();
    let placed = [
        ("house", BlockPos::new(2, 1, 2), "alice"),
        ("farm", BlockPos::new(12, 1, 2), "alice"),
        ("barracks", BlockPos::new(2, 1, 20), "bob"),
    ];
    for (name, origin, owner) in placed {
        h.place(name, origin, owner, &[]).unwrap();
    }
    h.drain();

    h.bus.player_joined(&h.world, "dave");
    let sent = h.drain();
    assert_eq!(sent.len(), placed.len());
    for (env, (name, origin, owner)) in sent.iter().zip(placed) {
        assert_eq!(env.recipient, Recipient::Player("dave".into()));
        match &env.notification {
            Notification::BuildingReplayed {
                name: n,
                origin: o,
                rotation,
                owner: w,
                ..
            } => {
                assert_eq!(n, name);
                assert_eq!(*o, origin);
                assert_eq!(*rotation, Rotation::None);
                assert_eq!(w, owner);
            }
            other => panic!("unexpected notification {other:?}"),
        }
    }
}

#[test]
fn test_encoded_outbox_round_trips() {
    let mut h = Harness::fast();
    h.place("farm", BlockPos::new(2, 1, 2), "alice", &[]).unwrap();
    let encoded = h.server.borrow_mut().sink_mut().drain_encoded().unwrap();
    assert_eq!(encoded.len(), 1);
    let decoded = bulwark_buildings::decode_envelope(&encoded[0].1).unwrap();
    assert!(matches!(decoded.notification, Notification::BuildingPlaced { .. }));
}
