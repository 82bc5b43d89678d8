//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_NAME: &str = "bulwark";
const CONFIG_FILE: &str = "config.ron";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Simulation loop settings.
    pub server: ServerConfig,
    /// Building lifecycle tuning.
    pub buildings: BuildingsConfig,
    /// Starting balances handed to every new owner.
    pub resources: ResourcesConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Simulation loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Name of the only dimension whose ticks drive building simulation.
    pub authoritative_dimension: String,
    /// Stop after this many ticks (0 = run until interrupted).
    pub max_ticks: u64,
}

/// Building lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildingsConfig {
    /// Ticks between two building sync broadcasts.
    pub sync_period_ticks: u32,
    /// Hard ceiling on the population supply an owner can hold.
    pub max_population: u32,
    /// Builder work units needed to materialise one queued block.
    pub ticks_per_block: u32,
    /// Manual block breaks on one building between two assisted explosions.
    pub breaks_per_explosion: u32,
    /// Radius of the explosion triggered by repeated manual breaks.
    pub assist_explosion_radius: f64,
    /// Built buildings below this placed fraction start losing blocks.
    pub decay_threshold: f32,
    /// Ticks between two decayed blocks.
    pub decay_interval_ticks: u32,
    /// Radius of the cosmetic explosion fired when a building is torn down.
    pub teardown_explosion_radius: f64,
}

/// Starting resources for an owner the ledger has not seen before.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Starting food.
    pub food: i32,
    /// Starting wood.
    pub wood: i32,
    /// Starting ore.
    pub ore: i32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write a JSON log file next to the config in debug builds.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            authoritative_dimension: "overworld".to_string(),
            max_ticks: 0,
        }
    }
}

impl Default for BuildingsConfig {
    fn default() -> Self {
        Self {
            sync_period_ticks: 20,
            max_population: 150,
            ticks_per_block: 4,
            breaks_per_explosion: 5,
            assist_explosion_radius: 2.5,
            decay_threshold: 0.75,
            decay_interval_ticks: 40,
            teardown_explosion_radius: 3.0,
        }
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            food: 500,
            wood: 500,
            ore: 200,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: true,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for the server (`<config_dir>/bulwark`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|base| base.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Resolves the directory to load from: the explicit override if given,
    /// otherwise [`default_dir`](Self::default_dir).
    pub fn resolve_dir(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        match explicit {
            Some(dir) if dir.exists() && !dir.is_dir() => {
                Err(ConfigError::NotADirectory(dir.to_path_buf()))
            }
            Some(dir) => Ok(dir.to_path_buf()),
            None => Self::default_dir(),
        }
    }

    /// Reads `config.ron` from `config_dir`, writing the defaults there
    /// first when the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let defaults = Config::default();
            defaults.save(config_dir)?;
            log::info!("Wrote default server config to {}", path.display());
            return Ok(defaults);
        }
        let config = read_config(&path)?;
        log::info!("Server config loaded from {}", path.display());
        Ok(config)
    }

    /// Writes this config to `config_dir/config.ron`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;
        let pretty = ron::ser::PrettyConfig::new().depth_limit(3);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;
        std::fs::write(config_dir.join(CONFIG_FILE), text).map_err(ConfigError::WriteError)
    }

    /// Re-reads the file. Returns the new config only if it differs from
    /// `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_config(&config_dir.join(CONFIG_FILE))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("Server config changed on disk");
        Ok(Some(fresh))
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
    ron::from_str(&text).map_err(ConfigError::ParseError)
}
