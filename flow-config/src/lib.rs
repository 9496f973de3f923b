//! Loads the engine's scheduler limits from XDG `config.toml` and project `.env`, then applies
//! them to the process environment with priority: **existing env > .env > XDG**.
//!
//! The engine core never reads `std::env` itself (it takes `EngineLimits` as a parameter); this
//! crate is how a host binary builds that value from the ambient configuration surface.

mod dotenv;
mod xdg_toml;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("xdg config path: {0}")]
    XdgPath(String),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Scheduler ceilings the engine enforces. See the scheduler loop's iteration guard and
/// per-loop-node re-enqueue guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineLimits {
    pub max_iterations: u32,
    pub max_loop_count: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_loop_count: 10,
        }
    }
}

/// Loads config from XDG `config.toml` and optional project `.env`, applies env vars for keys
/// not already set in the process environment, then reads `MAX_ITERATIONS` / `MAX_LOOP_COUNT`
/// into an `EngineLimits`. Unparsable or absent values fall back to `EngineLimits::default()`
/// fields individually.
pub fn load_limits(app_name: &str, override_dir: Option<&Path>) -> Result<EngineLimits, LoadError> {
    load_and_apply(app_name, override_dir)?;

    let default = EngineLimits::default();
    let max_iterations = std::env::var("MAX_ITERATIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default.max_iterations);
    let max_loop_count = std::env::var("MAX_LOOP_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default.max_loop_count);

    Ok(EngineLimits {
        max_iterations,
        max_loop_count,
    })
}

/// Order of precedence when a key is missing in the process environment:
/// 1. Value from project `.env` (current directory or `override_dir` if given)
/// 2. Value from `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]` table
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg_toml::load_env_map(app_name)?;
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<String> = xdg_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue; // existing env wins
        }
        let value = dotenv_map.get(&key).or_else(|| xdg_map.get(&key)).cloned();
        if let Some(v) = value {
            std::env::set_var(&key, v);
        }
    }

    Ok(())
}
