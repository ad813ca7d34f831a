// src/output/memory.rs

//! In-memory [`PipeSource`] for tests.
//!
//! Chunk boundaries are preserved: each `push` is returned by a separate
//! read (split further only when it exceeds the read size), which lets tests
//! control exactly how output is fragmented.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::Result;
use crate::output::PipeSource;

#[derive(Debug, Clone)]
pub struct MemoryPipe {
    path: PathBuf,
    chunks: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl MemoryPipe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunks: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queue one chunk of output.
    pub fn push(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut chunks = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        chunks.push_back(bytes.to_vec());
    }

    /// Total bytes not yet read.
    pub fn buffered(&self) -> usize {
        let chunks = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        chunks.iter().map(Vec::len).sum()
    }
}

impl PipeSource for MemoryPipe {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_available(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut chunks = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut chunk) = chunks.pop_front() else {
            return Ok(Vec::new());
        };
        if chunk.len() > max {
            let rest = chunk.split_off(max);
            chunks.push_front(rest);
        }
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_respect_chunk_boundaries_and_limit() {
        let mut pipe = MemoryPipe::new("/virtual/pipe");
        pipe.push(b"abcdef");
        pipe.push(b"gh");

        assert_eq!(pipe.read_available(4).unwrap(), b"abcd");
        assert_eq!(pipe.read_available(4).unwrap(), b"ef");
        assert_eq!(pipe.buffered(), 2);
        assert_eq!(pipe.read_available(4).unwrap(), b"gh");
        assert!(pipe.read_available(4).unwrap().is_empty());
    }
}
