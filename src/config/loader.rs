// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load the raw config at `path`, or defaults when `path` is the implicit
/// default location and no file exists there.
pub fn load_or_default(path: &Path, explicit: bool) -> Result<RawConfigFile> {
    if !explicit && !path.exists() {
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(RawConfigFile::default());
    }
    load_from_path(path)
}

/// Default config location: `T32ctl.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("T32ctl.toml")
}
