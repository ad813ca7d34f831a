// src/output/sentinel.rs

//! Incremental sentinel matching over a chunked byte stream.
//!
//! [`SentinelMatcher`] is fed raw reads from the output pipe. It releases
//! every byte that cannot be part of the sentinel and holds back only the
//! longest trailing fragment that could still grow into it, so a sentinel
//! split across two reads is still found and never leaks into the output.

use rand::Rng;

/// Outcome of feeding one block into a [`SentinelMatcher`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MatchStep {
    /// Bytes that are known to precede the sentinel.
    pub emit: Vec<u8>,
    /// Set once the sentinel has been seen.
    pub found: bool,
    /// Bytes that followed the sentinel in the same block (discarded).
    pub trailing: usize,
}

#[derive(Debug, Clone)]
pub struct SentinelMatcher {
    sentinel: Vec<u8>,
    carry: Vec<u8>,
    found: bool,
}

impl SentinelMatcher {
    pub fn new(sentinel: impl Into<Vec<u8>>) -> Self {
        Self {
            sentinel: sentinel.into(),
            carry: Vec::new(),
            found: false,
        }
    }

    pub fn is_found(&self) -> bool {
        self.found
    }

    /// Bytes currently held back as a possible sentinel prefix.
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }

    pub fn push(&mut self, block: &[u8]) -> MatchStep {
        if self.found {
            return MatchStep {
                emit: Vec::new(),
                found: true,
                trailing: block.len(),
            };
        }
        if self.sentinel.is_empty() {
            self.found = true;
            return MatchStep {
                emit: std::mem::take(&mut self.carry),
                found: true,
                trailing: block.len(),
            };
        }

        let mut buffer = std::mem::take(&mut self.carry);
        buffer.extend_from_slice(block);

        if let Some(idx) = find(&buffer, &self.sentinel) {
            self.found = true;
            let trailing = buffer.len() - idx - self.sentinel.len();
            buffer.truncate(idx);
            return MatchStep {
                emit: buffer,
                found: true,
                trailing,
            };
        }

        for len in (1..self.sentinel.len()).rev() {
            if buffer.ends_with(&self.sentinel[..len]) {
                self.carry = buffer.split_off(buffer.len() - len);
                break;
            }
        }

        MatchStep {
            emit: buffer,
            found: false,
            trailing: 0,
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Random label of `len` upper-case ASCII letters.
pub fn random_label(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
        .collect()
}
