#![allow(dead_code)]

use std::path::PathBuf;

use t32ctl::config::{ConfigFile, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from polling intervals of a few milliseconds so tests against the
/// fake engine finish quickly.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.session.connect_timeout = "2s".to_string();
        config.session.probe_attempt = "200ms".to_string();
        config.session.probe_poll = "2ms".to_string();
        config.session.watch_poll = "2ms".to_string();
        config.session.drain_poll = "2ms".to_string();
        config.session.capture_poll = "2ms".to_string();
        Self { config }
    }

    pub fn node(mut self, node: &str) -> Self {
        self.config.link.node = node.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.link.port = port;
        self
    }

    pub fn packlen(mut self, packlen: u32) -> Self {
        self.config.link.packlen = Some(packlen);
        self
    }

    pub fn connect_timeout(mut self, value: &str) -> Self {
        self.config.session.connect_timeout = value.to_string();
        self
    }

    pub fn probe_attempt(mut self, value: &str) -> Self {
        self.config.session.probe_attempt = value.to_string();
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.config.session.block_size = size;
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.session.workdir = Some(dir.into());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
