// src/output/mod.rs

//! Side-channel output capture.
//!
//! The engine cannot return command output over the control channel, so its
//! output window is mirrored into a named pipe. This module reads that pipe:
//!
//! - [`PipeSource`] abstracts the non-blocking pipe (a real FIFO in
//!   production, an in-memory queue in tests).
//! - [`OutputChannel`] drains stale bytes and hands out [`SentinelReader`]s.
//! - [`sentinel`] holds the pure matching logic.

pub mod fifo;
pub mod memory;
pub mod sentinel;

use std::path::Path;
use std::time::Duration;

use tracing::trace;

use crate::errors::Result;

pub use fifo::FifoPipe;
pub use memory::MemoryPipe;
pub use sentinel::{MatchStep, SentinelMatcher, random_label};

/// A readable pipe the engine writes its output window into.
pub trait PipeSource: Send {
    /// Filesystem path the engine is told to append to.
    fn path(&self) -> &Path;

    /// Return up to `max` bytes that are available right now; an empty
    /// vector means nothing is buffered. Never blocks.
    fn read_available(&mut self, max: usize) -> Result<Vec<u8>>;
}

pub struct OutputChannel<P: PipeSource> {
    pipe: P,
    block_size: usize,
}

impl<P: PipeSource> OutputChannel<P> {
    pub fn new(pipe: P, block_size: usize) -> Self {
        Self {
            pipe,
            block_size: block_size.max(1),
        }
    }

    pub fn pipe_path(&self) -> &Path {
        self.pipe.path()
    }

    pub fn pipe(&self) -> &P {
        &self.pipe
    }

    /// Discard everything currently buffered in the pipe.
    pub fn drain_pending(&mut self) -> Result<usize> {
        let mut discarded = 0;
        loop {
            let chunk = self.pipe.read_available(self.block_size)?;
            if chunk.is_empty() {
                break;
            }
            discarded += chunk.len();
        }
        if discarded > 0 {
            trace!(bytes = discarded, "drained stale pipe output");
        }
        Ok(discarded)
    }

    /// One non-blocking read of whatever is buffered.
    pub fn read_available(&mut self) -> Result<Vec<u8>> {
        self.pipe.read_available(self.block_size)
    }

    /// Stream everything written before the first occurrence of `sentinel`.
    ///
    /// The pipe is polled every `poll` until the sentinel shows up; there is
    /// no overall deadline.
    pub fn read_until(&mut self, sentinel: &[u8], poll: Duration) -> SentinelReader<'_, P> {
        SentinelReader {
            channel: self,
            matcher: SentinelMatcher::new(sentinel),
            poll,
            polled: false,
        }
    }
}

/// Lazy, finite sequence of output chunks ending at a sentinel.
///
/// Once the sentinel has been found, [`SentinelReader::next_chunk`] keeps
/// returning `None`; a reader cannot be restarted.
pub struct SentinelReader<'a, P: PipeSource> {
    channel: &'a mut OutputChannel<P>,
    matcher: SentinelMatcher,
    poll: Duration,
    polled: bool,
}

impl<P: PipeSource> SentinelReader<'_, P> {
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        while !self.matcher.is_found() {
            if self.polled {
                tokio::time::sleep(self.poll).await;
            }
            self.polled = true;

            let block = self.channel.pipe.read_available(self.channel.block_size)?;
            if block.is_empty() {
                continue;
            }
            let step = self.matcher.push(&block);
            if step.trailing > 0 {
                trace!(bytes = step.trailing, "discarding output after sentinel");
            }
            if !step.emit.is_empty() {
                return Ok(Some(step.emit));
            }
        }
        Ok(None)
    }

    /// Consume the reader and concatenate every chunk.
    pub async fn collect(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(chunks: &[&[u8]]) -> OutputChannel<MemoryPipe> {
        let pipe = MemoryPipe::new("/virtual/area.fifo");
        for chunk in chunks {
            pipe.push(chunk);
        }
        OutputChannel::new(pipe, 4096)
    }

    #[tokio::test]
    async fn read_until_stops_at_the_sentinel() {
        let mut output = channel(&[b"hello ", b"world", b"MARK", b"ignored"]);
        let collected = output
            .read_until(b"MARK", Duration::from_millis(1))
            .collect()
            .await
            .unwrap();
        assert_eq!(collected, b"hello world");
    }

    #[tokio::test]
    async fn drain_then_sentinel_only_yields_empty_sequence() {
        let mut output = channel(&[b"stale bytes"]);
        assert_eq!(output.drain_pending().unwrap(), 11);

        output.pipe().push(b"MARK");
        let mut reader = output.read_until(b"MARK", Duration::from_millis(1));
        assert_eq!(reader.next_chunk().await.unwrap(), None);
        assert_eq!(reader.next_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn waits_for_late_output() {
        let mut output = channel(&[]);
        let feeder = output.pipe().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            feeder.push(b"late");
            feeder.push(b"MA");
            feeder.push(b"RK");
        });
        let collected = output
            .read_until(b"MARK", Duration::from_millis(2))
            .collect()
            .await
            .unwrap();
        assert_eq!(collected, b"late");
    }
}
