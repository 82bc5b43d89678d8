//! Configuration system for the Bulwark server.
//!
//! Settings persist to disk as RON and can be overridden from the command
//! line. Every section is `#[serde(default)]`, so old config files keep
//! loading when new fields appear.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{BuildingsConfig, Config, DebugConfig, ResourcesConfig, ServerConfig};
pub use error::ConfigError;
