//! Command-line argument parsing for the Bulwark server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Bulwark server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "bulwark-server", about = "Bulwark building simulation server")]
pub struct CliArgs {
    /// Simulation ticks per second.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Stop after this many ticks.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Ticks between building sync broadcasts.
    #[arg(long)]
    pub sync_period: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(rate) = args.tick_rate {
            self.server.tick_rate = rate;
        }
        if let Some(ticks) = args.ticks {
            self.server.max_ticks = ticks;
        }
        if let Some(period) = args.sync_period {
            self.buildings.sync_period_ticks = period;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
