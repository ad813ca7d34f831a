// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::rpc::LinkParams;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [link]
/// node = "localhost"
/// port = 20000
/// packlen = 1024
///
/// [session]
/// connect_timeout = "10s"
/// drain_poll = "25ms"
/// ```
///
/// Both sections are optional and have defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub link: LinkSection,

    #[serde(default)]
    pub session: SessionSection,
}

/// `[link]` section: where the engine's remote API listens.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkSection {
    #[serde(default = "default_node")]
    pub node: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum packet length for the remote API.
    #[serde(default)]
    pub packlen: Option<u32>,

    /// Remote API timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u32>,

    #[serde(default)]
    pub hostport: Option<u16>,
}

fn default_node() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    20000
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            node: default_node(),
            port: default_port(),
            packlen: None,
            timeout: None,
            hostport: None,
        }
    }
}

/// `[session]` section: connect deadline, polling intervals and I/O sizes.
///
/// Durations are strings like `"500ms"`, `"10s"`, `"2m"`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// Overall deadline for `connect`.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// How long a single reachability probe may run before it is killed.
    #[serde(default = "default_probe_attempt")]
    pub probe_attempt: String,

    /// How often a running probe is checked.
    #[serde(default = "default_fast_poll")]
    pub probe_poll: String,

    /// How often the script watcher asks whether the interpreter is idle.
    #[serde(default = "default_fast_poll")]
    pub watch_poll: String,

    /// Pipe polling while a script runs.
    #[serde(default = "default_drain_poll")]
    pub drain_poll: String,

    /// Pipe polling while waiting for a sentinel.
    #[serde(default = "default_capture_poll")]
    pub capture_poll: String,

    /// Maximum bytes taken from the pipe per read.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Base directory for the per-session temp directory.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

fn default_probe_attempt() -> String {
    "500ms".to_string()
}

fn default_fast_poll() -> String {
    "10ms".to_string()
}

fn default_drain_poll() -> String {
    "25ms".to_string()
}

fn default_capture_poll() -> String {
    "50ms".to_string()
}

fn default_block_size() -> usize {
    4096
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            probe_attempt: default_probe_attempt(),
            probe_poll: default_fast_poll(),
            watch_poll: default_fast_poll(),
            drain_poll: default_drain_poll(),
            capture_poll: default_capture_poll(),
            block_size: default_block_size(),
            workdir: None,
        }
    }
}

/// Parsed timing values used by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub connect_timeout: Duration,
    pub probe_attempt: Duration,
    pub probe_poll: Duration,
    pub watch_poll: Duration,
    pub drain_poll: Duration,
    pub capture_poll: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            probe_attempt: Duration::from_millis(500),
            probe_poll: Duration::from_millis(10),
            watch_poll: Duration::from_millis(10),
            drain_poll: Duration::from_millis(25),
            capture_poll: Duration::from_millis(50),
        }
    }
}

/// Validated configuration.
///
/// Constructed through `TryFrom<RawConfigFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub link: LinkParams,
    pub timing: Timing,
    pub block_size: usize,
    pub workdir: Option<PathBuf>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        link: LinkParams,
        timing: Timing,
        block_size: usize,
        workdir: Option<PathBuf>,
    ) -> Self {
        Self {
            link,
            timing,
            block_size,
            workdir,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            link: LinkParams::default(),
            timing: Timing::default(),
            block_size: default_block_size(),
            workdir: None,
        }
    }
}
