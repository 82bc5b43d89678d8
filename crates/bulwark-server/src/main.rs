//! Headless Bulwark server.
//!
//! Loads config, generates a flat demo level, plays a short scripted
//! session against the building subsystem and logs every notification the
//! clients would receive.
//!
//! Run with: `cargo run -p bulwark-server -- --ticks 800`

mod demo;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use bulwark_buildings::{BuildingServer, Outbox, PlayerResources, TemplateLibrary};
use bulwark_config::{CliArgs, Config};
use bulwark_sim::{HookBus, ServerTickSchedule, SharedHooks};
use clap::Parser;
use tracing::{error, info, trace, warn};

const TEMPLATE_FILE: &str = "templates.ron";
const DEMO_LEVEL_ID: u64 = 1;

fn main() {
    let args = CliArgs::parse();

    let dir = match Config::resolve_dir(args.config.as_deref()) {
        Ok(dir) => Some(dir),
        Err(e) => {
            eprintln!("No config directory: {e}");
            None
        }
    };
    let mut config = match dir.as_deref().map(Config::load_or_create) {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            eprintln!("Config unusable, falling back to defaults: {e}");
            Config::default()
        }
        None => Config::default(),
    };
    config.apply_cli_overrides(&args);

    bulwark_log::init_logging(dir.as_deref(), cfg!(debug_assertions), Some(&config));
    info!(
        tick_rate = config.server.tick_rate,
        max_ticks = config.server.max_ticks,
        dimension = %config.server.authoritative_dimension,
        "Bulwark server starting"
    );

    let mut library = TemplateLibrary::builtin();
    if let Some(path) = dir.as_deref().map(|d| d.join(TEMPLATE_FILE))
        && path.exists()
    {
        if let Err(e) = library.load_ron_file(&path) {
            warn!(error = %e, path = %path.display(), "Ignoring template file");
        }
    }
    info!(templates = library.len(), "Template library ready");

    let mut world = match demo::flat_world(DEMO_LEVEL_ID, &library) {
        Ok(world) => world,
        Err(e) => {
            error!(error = %e, "Failed to build the demo level");
            return;
        }
    };

    let server = Rc::new(RefCell::new(BuildingServer::new(
        &config,
        library,
        PlayerResources::from_config(&config.resources),
        Outbox::new(),
    )));
    let mut bus = HookBus::new();
    bus.subscribe(server.clone() as SharedHooks);

    let session = demo::Session::start(&bus, &*server, &mut world);
    flush_outbox(&server);

    let mut schedule = ServerTickSchedule::with_tick_rate(config.server.tick_rate);
    let max_ticks = config.server.max_ticks;
    let finished = |tick: u64| max_ticks > 0 && tick >= max_ticks;
    let mut last = Instant::now();
    while !finished(world.tick()) {
        let now = Instant::now();
        let due = schedule.accumulate(now.duration_since(last).as_secs_f64());
        last = now;

        for _ in 0..due {
            if finished(world.tick()) {
                break;
            }
            bus.run_tick(&mut world);
            session.on_tick(world.tick(), &bus, &*server, &mut world);
            flush_outbox(&server);
        }

        std::thread::sleep(Duration::from_secs_f64(schedule.tick_secs() / 2.0));
    }

    let server = server.borrow();
    info!(
        ticks = world.tick(),
        dropped = schedule.dropped_ticks(),
        buildings = server.registry().len(),
        alice_pop = server.registry().total_population_supply("alice"),
        bob_pop = server.registry().total_population_supply("bob"),
        "Bulwark server stopped"
    );
}

/// Encodes and logs everything queued for clients since the last flush.
fn flush_outbox(server: &RefCell<BuildingServer<PlayerResources, Outbox>>) {
    let mut server = server.borrow_mut();
    let pending: Vec<String> = server
        .sink()
        .pending()
        .iter()
        .map(|e| format!("{:?}", e.notification))
        .collect();
    match server.sink_mut().drain_encoded() {
        Ok(frames) => {
            for ((recipient, bytes), summary) in frames.iter().zip(&pending) {
                trace!(?recipient, bytes = bytes.len(), "{summary}");
            }
        }
        Err(e) => error!(error = %e, "Failed to encode notifications"),
    }
}
