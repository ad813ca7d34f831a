// src/session/guard.rs

//! Cleanup guard for the session's control channel.
//!
//! Once a channel has been initialised it must be closed again, even when
//! the session is dropped halfway through an operation. The guard owns the
//! resource; a hook registered after a successful `init` runs exactly once
//! on drop unless the session deregistered it during a clean disconnect.

use tracing::{debug, warn};

use crate::rpc::{ControlChannel, RemotePrimitives};

pub struct CleanupGuard<T: Send + 'static> {
    resource: Option<T>,
    hook: Option<fn(T)>,
}

impl<T: Send + 'static> CleanupGuard<T> {
    pub fn new(resource: T) -> Self {
        Self {
            resource: Some(resource),
            hook: None,
        }
    }

    pub fn register(&mut self, hook: fn(T)) {
        self.hook = Some(hook);
    }

    pub fn deregister(&mut self) {
        self.hook = None;
    }

    pub fn is_armed(&self) -> bool {
        self.hook.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.resource.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.resource.as_mut()
    }
}

impl<T: Send + 'static> Drop for CleanupGuard<T> {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            if let Some(resource) = self.resource.take() {
                hook(resource);
            }
        }
    }
}

/// Abandon hook for control channels: close the channel in the background.
pub(crate) fn exit_on_abandon<A: RemotePrimitives>(mut channel: ControlChannel<A>) {
    if !channel.is_open() {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                match channel.exit().await {
                    Ok(()) => debug!("abandoned control channel closed"),
                    Err(err) => debug!(error = %err, "closing abandoned control channel failed"),
                }
            });
        }
        Err(_) => warn!("no async runtime left; abandoned control channel not closed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    static CLEANED: AtomicUsize = AtomicUsize::new(0);
    static SKIPPED: AtomicUsize = AtomicUsize::new(0);

    fn count_cleanup(_: u32) {
        CLEANED.fetch_add(1, Ordering::SeqCst);
    }

    fn count_skipped(_: u32) {
        SKIPPED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn hook_runs_once_on_drop() {
        let mut guard = CleanupGuard::new(7u32);
        guard.register(count_cleanup);
        assert!(guard.is_armed());
        assert_eq!(guard.get(), Some(&7));
        drop(guard);
        assert_eq!(CLEANED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deregistered_hook_does_not_run() {
        let mut guard = CleanupGuard::new(1u32);
        guard.register(count_skipped);
        guard.deregister();
        drop(guard);
        assert_eq!(SKIPPED.load(Ordering::SeqCst), 0);
    }
}
