// src/session/worker.rs

//! Supervised helper tasks.
//!
//! Probing the engine and watching a running script both happen on
//! channels of their own, in tasks the session does not await directly. A
//! [`Worker`] reports back only through its exit code; the session polls
//! for it on a wall-clock interval and aborts the task when it gives up.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::rpc::{Connector, ControlChannel, DeviceKind, LinkParams, PracticeState};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
/// Reported for a worker that was aborted or panicked.
pub const EXIT_ABNORMAL: i32 = -1;

pub struct Worker {
    label: &'static str,
    handle: JoinHandle<()>,
    status: oneshot::Receiver<i32>,
    exit: Option<i32>,
}

impl Worker {
    pub fn spawn<F>(label: &'static str, work: F) -> Self
    where
        F: Future<Output = i32> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let code = work.await;
            let _ = tx.send(code);
        });
        debug!(worker = label, "worker started");
        Self {
            label,
            handle,
            status: rx,
            exit: None,
        }
    }

    /// Exit code, once the worker has finished.
    pub fn exit_code(&mut self) -> Option<i32> {
        if self.exit.is_none() {
            match self.status.try_recv() {
                Ok(code) => self.exit = Some(code),
                Err(TryRecvError::Closed) => self.exit = Some(EXIT_ABNORMAL),
                Err(TryRecvError::Empty) => {}
            }
        }
        self.exit
    }

    pub fn is_alive(&mut self) -> bool {
        self.exit_code().is_none()
    }

    /// Abort the worker if it is still running.
    pub fn kill(&mut self) {
        if self.is_alive() {
            self.handle.abort();
            self.exit = Some(EXIT_ABNORMAL);
            debug!(worker = self.label, "worker killed");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Try once to open, attach and close a channel of its own.
pub fn spawn_probe<C: Connector>(connector: C, link: LinkParams) -> Worker {
    Worker::spawn("probe", async move {
        let mut channel = ControlChannel::new(connector.open());
        match probe_once(&mut channel, &link).await {
            Ok(()) => EXIT_OK,
            Err(err) => {
                debug!(error = %err, "probe attempt failed");
                if channel.is_open() {
                    let _ = channel.exit().await;
                }
                EXIT_FAILED
            }
        }
    })
}

async fn probe_once<A: crate::rpc::RemotePrimitives>(
    channel: &mut ControlChannel<A>,
    link: &LinkParams,
) -> Result<()> {
    channel.configure_link(link).await?;
    channel.init().await?;
    channel.attach(DeviceKind::Icd).await?;
    channel.exit().await
}

/// Poll the interpreter on a channel of its own until it reports idle.
pub fn spawn_idle_watcher<C: Connector>(connector: C, link: LinkParams, poll: Duration) -> Worker {
    Worker::spawn("idle-watcher", async move {
        let mut channel = ControlChannel::new(connector.open());
        let result = wait_for_idle(&mut channel, &link, poll).await;
        if channel.is_open() {
            let _ = channel.exit().await;
        }
        match result {
            Ok(polls) => {
                debug!(polls, "interpreter idle");
                EXIT_OK
            }
            Err(err) => {
                warn!(error = %err, "idle watcher failed");
                EXIT_FAILED
            }
        }
    })
}

async fn wait_for_idle<A: crate::rpc::RemotePrimitives>(
    channel: &mut ControlChannel<A>,
    link: &LinkParams,
    poll: Duration,
) -> Result<u32> {
    channel.configure_link(link).await?;
    channel.init().await?;
    channel.attach(DeviceKind::Icd).await?;

    let mut polls = 0u32;
    loop {
        polls += 1;
        if channel.practice_state().await? == PracticeState::Idle {
            return Ok(polls);
        }
        tokio::time::sleep(poll).await;
    }
}
