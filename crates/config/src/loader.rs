use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::VigilConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["vigil.toml", "vigil.yaml", "vigil.yml", "vigil.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<VigilConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./vigil.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/vigil/vigil.{toml,yaml,yml,json}` (user-global)
///
/// Returns `VigilConfig::default()` if no config file is found.
/// Env overrides are applied after load in both cases.
pub fn discover_and_load() -> VigilConfig {
    let mut cfg = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                VigilConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        VigilConfig::default()
    };
    apply_env_overrides(&mut cfg);
    cfg
}

/// Apply `VIGIL_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(cfg: &mut VigilConfig) {
    apply_env_overrides_with(cfg, |name| std::env::var(name).ok());
}

/// Override application with an injectable lookup, so tests don't have
/// to mutate the process environment.
fn apply_env_overrides_with(cfg: &mut VigilConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("VIGIL_DATABASE_URL") {
        cfg.database.url = url;
    }
    if let Some(tz) = lookup("VIGIL_TIMEZONE") {
        cfg.scheduler.timezone = tz;
    }
    if let Some(bind) = lookup("VIGIL_BIND") {
        cfg.server.bind = bind;
    }
    if let Some(port) = lookup("VIGIL_PORT").and_then(|p| p.parse().ok()) {
        cfg.server.port = port;
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/vigil/
    if let Some(dirs) = directories::ProjectDirs::from("", "", "vigil") {
        let config_dir = dirs.config_dir();
        for name in CONFIG_FILENAMES {
            let p = config_dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

fn parse_config(raw: &str, path: &Path) -> Result<VigilConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).context("invalid toml"),
        "yaml" | "yml" => serde_yaml::from_str(raw).context("invalid yaml"),
        "json" => serde_json::from_str(raw).context("invalid json"),
        _ => Err(Error::message(format!("unsupported config format: .{ext}"))),
    }
}
