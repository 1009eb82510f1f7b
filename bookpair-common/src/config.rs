//! Configuration file discovery and path resolution
//!
//! Settings resolve in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BOOKPAIR_CONFIG";

/// Application directory name under the platform config/data dirs
const APP_DIR: &str = "bookpair";

/// Resolve a filesystem path following the priority order above.
///
/// `config_value` is the value already read from the TOML file, if any.
pub fn resolve_path(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_value: Option<&str>,
    default: PathBuf,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = config_value {
        return PathBuf::from(path);
    }

    // Priority 4: OS-dependent compiled default
    default
}

/// Locate the config file to load, if any.
///
/// Search order: explicit path, `BOOKPAIR_CONFIG`, `./bookpair.toml`,
/// the user config dir, then `/etc/bookpair/config.toml` on Linux.
/// An explicit path that does not exist is an error; a missing
/// discovered file is not.
pub fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(Error::Config(format!("Config file not found: {}", path.display())));
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(Some(path));
        }
        warn!("{} points at missing file {}, ignoring", CONFIG_ENV_VAR, path.display());
    }

    let mut candidates = vec![PathBuf::from("bookpair.toml")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(APP_DIR).join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc/bookpair/config.toml"));
    }

    Ok(candidates.into_iter().find(|p| p.exists()))
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    let parsed = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    debug!("Loaded config file {}", path.display());
    Ok(parsed)
}

/// Load a config from the discovered file, or defaults when none exists.
///
/// A missing file is not fatal. A malformed one is.
pub fn load_or_default<T: DeserializeOwned + Default>(explicit: Option<&Path>) -> Result<T> {
    match find_config_file(explicit)? {
        Some(path) => load_toml(&path),
        None => {
            debug!("No config file found, using compiled defaults");
            Ok(T::default())
        }
    }
}

/// OS-dependent data directory for databases and run artifacts
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./bookpair_data"))
}

/// Default SQLite database location
pub fn default_database_path() -> PathBuf {
    default_data_dir().join("bookpair.db")
}
