// src/session/mod.rs

//! Debugger session: connection lifecycle and execution.
//!
//! A [`Session`] owns one control channel to the engine, the pipe its output
//! window is mirrored into, and a private work directory. The lifecycle is
//! implemented in [`connect`]; commands, evaluation and memory access in
//! `exec`; scripts (which must run with the control channel closed) in
//! `script`.

pub mod connect;
mod exec;
pub mod guard;
mod script;
pub mod window;
pub mod worker;
pub mod workdir;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use crate::config::ConfigFile;
use crate::errors::{Result, T32Error};
use crate::output::{OutputChannel, PipeSource};
use crate::rpc::{Connector, ControlChannel};

pub use guard::CleanupGuard;
pub use script::validate_script;
pub use window::OutputWindow;
pub use workdir::Workdir;

/// Length of the random sentinels printed after each operation.
pub const FLAG_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectMode {
    /// Shut the engine down with the given exit code.
    Graceful { exit_code: i32 },
    /// Leave the engine running; only remove this session's output window.
    Forced,
}

/// Requests that a running script be stopped.
///
/// Each call bumps a generation counter; a script subscribes when it starts
/// and reacts to any bump seen after that.
#[derive(Debug, Clone)]
pub struct InterruptHandle(Arc<watch::Sender<u64>>);

impl Default for InterruptHandle {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self(Arc::new(tx))
    }
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Receiver that only fires for interrupts requested after this call.
    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.0.subscribe()
    }
}

/// Optional sink that receives captured output as it arrives.
#[derive(Default)]
pub(crate) struct Transcript {
    sink: Option<Box<dyn Write + Send>>,
}

impl Transcript {
    pub(crate) fn record(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.write_all(bytes).and_then(|()| sink.flush()) {
                warn!(error = %err, "transcript write failed");
            }
        }
    }

    pub(crate) fn record_line(&mut self, line: &str) {
        self.record(format!("{line}\n").as_bytes());
    }
}

pub struct Session<C: Connector, P: PipeSource> {
    link: CleanupGuard<ControlChannel<C::Api>>,
    connector: C,
    config: ConfigFile,
    output: OutputChannel<P>,
    window: OutputWindow,
    state: LinkState,
    transcript: Transcript,
    interrupt: InterruptHandle,
    workdir: Workdir,
}

impl<C: Connector, P: PipeSource> Session<C, P> {
    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn window(&self) -> &OutputWindow {
        &self.window
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn pipe_path(&self) -> &Path {
        self.output.pipe_path()
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Mirror all captured output into `sink`.
    pub fn set_transcript(&mut self, sink: Box<dyn Write + Send>) {
        self.transcript.sink = Some(sink);
    }

    fn channel(&mut self) -> Result<&mut ControlChannel<C::Api>> {
        self.link.get_mut().ok_or(T32Error::NotConnected)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state == LinkState::Connected {
            Ok(())
        } else {
            Err(T32Error::NotConnected)
        }
    }
}
