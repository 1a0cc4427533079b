//! Optional defaults file for the cbtainers command line
//!
//! Values found here sit below flags and `CBTAINERS_*` variables and above
//! the built-in defaults.

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_ENV: &str = "CBTAINERS_CONFIG";
pub const LOCAL_FILE: &str = "cbtainers.yaml";

/// Every field is optional; absent fields fall through to the next layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    pub image: Option<String>,
    pub num: Option<usize>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub prefix: Option<String>,
    pub probe_host: Option<String>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
}

/// Locate the defaults file.
///
/// Search order:
/// 1. `CBTAINERS_CONFIG` (used only if the file exists)
/// 2. `./cbtainers.yaml`
/// 3. `<config dir>/cbtainers/config.yaml`
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.is_file() {
            return Some(path);
        }
        debug!(path = %path.display(), "{} points at a missing file", CONFIG_ENV);
    }

    if let Ok(current_dir) = std::env::current_dir() {
        let path = current_dir.join(LOCAL_FILE);
        if path.is_file() {
            return Some(path);
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("cbtainers").join("config.yaml"))
        .filter(|path| path.is_file())
}

pub fn load_from(path: &Path) -> Result<Defaults> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(Defaults::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Defaults from the discovered file, or empty defaults when there is none
pub fn load_defaults() -> Result<Defaults> {
    match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading defaults");
            load_from(&path)
        }
        None => Ok(Defaults::default()),
    }
}
