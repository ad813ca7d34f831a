// src/session/connect.rs

//! Connection lifecycle.
//!
//! The first `init` against an unreachable or half-started engine can hang
//! indefinitely, so reachability is established by short-lived probe
//! workers on channels of their own. Each probe gets `probe_attempt` before
//! it is killed and replaced, all within the overall `connect_timeout`.
//! Only after a probe succeeds does the session initialise its own channel.

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{Result, T32Error};
use crate::output::{OutputChannel, PipeSource};
use crate::rpc::{Connector, ControlChannel, DeviceKind};
use crate::session::guard::{CleanupGuard, exit_on_abandon};
use crate::session::worker::{EXIT_OK, spawn_probe};
use crate::session::{
    DisconnectMode, InterruptHandle, LinkState, OutputWindow, Session, Transcript, Workdir,
};

impl<C: Connector, P: PipeSource> Session<C, P> {
    /// Connect to the engine and route its output into `pipe`.
    ///
    /// Fails with a communication error when the engine does not answer
    /// within `config.timing.connect_timeout`.
    pub async fn connect(connector: C, pipe: P, workdir: Workdir, config: ConfigFile) -> Result<Self> {
        let channel = ControlChannel::new(connector.open());
        let output = OutputChannel::new(pipe, config.block_size);
        let mut session = Session {
            link: CleanupGuard::new(channel),
            connector,
            config,
            output,
            window: OutputWindow::generate(),
            state: LinkState::Connecting,
            transcript: Transcript::default(),
            interrupt: InterruptHandle::default(),
            workdir,
        };

        info!(
            node = %session.config.link.node,
            port = session.config.link.port,
            window = session.window.name(),
            "connecting to engine"
        );
        session.establish().await?;
        info!(window = session.window.name(), "connected");
        Ok(session)
    }

    async fn establish(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.timing.connect_timeout;

        self.probe_until_reachable(deadline).await?;

        let link = self.config.link.clone();
        self.channel()?.configure_link(&link).await?;
        self.init_before(deadline).await?;
        self.link.register(exit_on_abandon::<C::Api>);

        let channel = self.channel()?;
        channel.attach(DeviceKind::Icd).await?;
        channel.ping().await?;
        self.state = LinkState::Connected;

        self.open_window().await
    }

    async fn probe_until_reachable(&self, deadline: Instant) -> Result<()> {
        let timing = self.config.timing;
        let mut attempt = 0u32;

        loop {
            if Instant::now() >= deadline {
                return Err(self.connect_timeout());
            }
            attempt += 1;

            let mut probe = spawn_probe(self.connector.clone(), self.config.link.clone());
            let attempt_deadline = Instant::now() + timing.probe_attempt;
            while probe.is_alive() && Instant::now() < attempt_deadline {
                if Instant::now() >= deadline {
                    probe.kill();
                    return Err(self.connect_timeout());
                }
                sleep(timing.probe_poll).await;
            }

            match probe.exit_code() {
                Some(EXIT_OK) => {
                    debug!(attempt, "engine reachable");
                    return Ok(());
                }
                Some(code) => {
                    debug!(attempt, code, "probe failed; retrying");
                    sleep(timing.probe_poll).await;
                }
                None => {
                    probe.kill();
                    debug!(attempt, "probe did not finish in time; retrying");
                }
            }
        }
    }

    async fn init_before(&mut self, deadline: Instant) -> Result<()> {
        let poll = self.config.timing.probe_poll;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.connect_timeout());
            }
            let attempt = tokio::time::timeout(remaining, self.channel()?.init()).await;
            match attempt {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) if err.is_communication() => {
                    debug!(error = %err, "init failed; retrying");
                    sleep(poll).await;
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(self.connect_timeout()),
            }
        }
    }

    async fn open_window(&mut self) -> Result<()> {
        self.output.drain_pending()?;
        let commands = self.window.create_commands(self.output.pipe_path());
        for command in &commands {
            self.channel()?.cmd(command).await?;
        }
        self.output.drain_pending()?;
        debug!(
            window = self.window.name(),
            pipe = %self.output.pipe_path().display(),
            "output window selected"
        );
        Ok(())
    }

    fn connect_timeout(&self) -> T32Error {
        T32Error::ConnectTimeout {
            node: self.config.link.node.clone(),
            port: self.config.link.port,
            timeout: self.config.timing.connect_timeout,
        }
    }

    /// Close the control channel so another client may use the engine.
    pub(crate) async fn release(&mut self) -> Result<()> {
        self.channel()?.exit().await
    }

    /// Reopen the control channel with the original link parameters.
    pub(crate) async fn reacquire(&mut self) -> Result<()> {
        let link = self.config.link.clone();
        let channel = self.channel()?;
        channel.configure_link(&link).await?;
        channel.init().await?;
        channel.attach(DeviceKind::Icd).await?;
        channel.ping().await?;
        debug!("control channel reacquired");
        Ok(())
    }

    /// Tear the session down. Calling this again is a no-op.
    pub async fn disconnect(&mut self, mode: DisconnectMode) -> Result<()> {
        if self.state == LinkState::Disconnected {
            debug!("already disconnected");
            return Ok(());
        }

        let result = self.teardown(mode).await;
        self.state = LinkState::Disconnected;
        match &result {
            Ok(()) => {
                self.link.deregister();
                info!(?mode, "disconnected");
            }
            Err(err) => warn!(?mode, error = %err, "disconnect incomplete"),
        }
        result
    }

    async fn teardown(&mut self, mode: DisconnectMode) -> Result<()> {
        match mode {
            DisconnectMode::Graceful { exit_code } => {
                self.channel()?.terminate(exit_code).await?;
                // The engine may already be gone once it has accepted the
                // shutdown request.
                if let Err(err) = self.channel()?.exit().await {
                    if !err.is_communication() {
                        return Err(err);
                    }
                    debug!(error = %err, "exit after terminate failed");
                }
                Ok(())
            }
            DisconnectMode::Forced => {
                for command in self.window.teardown_commands() {
                    self.channel()?.cmd(&command).await?;
                }
                self.channel()?.exit().await
            }
        }
    }
}
