//! Configuration loading, validation, and env substitution.
//!
//! Config files: `vigil.toml`, `vigil.yaml`, or `vigil.json`
//! Searched in `./` then `~/.config/vigil/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, discover_and_load, load_config},
    schema::{DatabaseConfig, HeartbeatConfig, SchedulerConfig, ServerConfig, VigilConfig},
};
