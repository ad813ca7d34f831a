// src/config/mod.rs

//! Configuration loading and validation for t32ctl.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate link parameters and timing values (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, LinkSection, RawConfigFile, SessionSection, Timing};
pub use validate::parse_duration;
