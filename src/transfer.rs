// src/transfer.rs

//! Blocked memory transfers.
//!
//! Large reads and writes are split into blocks of at most `block_size`
//! bytes. A block whose primitive call fails with a call failure is retried
//! up to [`MAX_ATTEMPTS`] times; communication errors are never retried.

use std::io::{Read, Write};

use tracing::{debug, info, warn};

use crate::errors::{Result, T32Error};
use crate::output::PipeSource;
use crate::rpc::Connector;
use crate::session::Session;

pub const MAX_ATTEMPTS: u32 = 8;

/// Read `length` bytes starting at `address` into `sink`.
pub async fn read_to<C, P, W>(
    session: &mut Session<C, P>,
    address: u64,
    length: u64,
    block_size: usize,
    sink: &mut W,
) -> Result<u64>
where
    C: Connector,
    P: PipeSource,
    W: Write + ?Sized,
{
    let block_size = block_size.max(1) as u64;
    let mut received = 0u64;

    while received < length {
        let chunk = block_size.min(length - received) as usize;
        let at = block_address(address, received, chunk)?;
        debug!(address = %hex(at), bytes = chunk, "reading block");

        let block = read_block(session, at, chunk).await?;
        sink.write_all(&block)?;
        received += block.len() as u64;
    }

    sink.flush()?;
    info!(address = %hex(address), bytes = received, "read complete");
    Ok(received)
}

/// Write everything from `source` starting at `address`. With `verify`, each
/// block is read back and rewritten until it matches.
pub async fn write_from<C, P, R>(
    session: &mut Session<C, P>,
    address: u64,
    block_size: usize,
    verify: bool,
    source: &mut R,
) -> Result<u64>
where
    C: Connector,
    P: PipeSource,
    R: Read + ?Sized,
{
    let mut buffer = vec![0u8; block_size.max(1)];
    let mut written = 0u64;

    loop {
        let filled = fill(source, &mut buffer)?;
        if filled == 0 {
            break;
        }
        let block = &buffer[..filled];
        let at = block_address(address, written, filled)?;
        write_block(session, at, block, verify).await?;
        written += filled as u64;
    }

    info!(address = %hex(address), bytes = written, "write complete");
    Ok(written)
}

async fn write_block<C: Connector, P: PipeSource>(
    session: &mut Session<C, P>,
    at: u64,
    block: &[u8],
    verify: bool,
) -> Result<()> {
    for attempt in 1..=MAX_ATTEMPTS {
        debug!(address = %hex(at), bytes = block.len(), attempt, "writing block");
        write_once(session, at, block).await?;
        if !verify {
            return Ok(());
        }

        let readback = read_block(session, at, block.len()).await?;
        if readback == block {
            return Ok(());
        }
        warn!(address = %hex(at), attempt, "readback mismatch; rewriting block");
    }
    Err(T32Error::ProtocolError(format!(
        "write to {at:#x} still differs on readback after {MAX_ATTEMPTS} attempts"
    )))
}

async fn read_block<C: Connector, P: PipeSource>(
    session: &mut Session<C, P>,
    at: u64,
    len: usize,
) -> Result<Vec<u8>> {
    let mut attempt = 1;
    loop {
        match session.read_memory(at, len, None).await {
            Err(err @ T32Error::CallFailure { .. }) if attempt < MAX_ATTEMPTS => {
                warn!(address = %hex(at), attempt, error = %err, "read failed; retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

async fn write_once<C: Connector, P: PipeSource>(
    session: &mut Session<C, P>,
    at: u64,
    block: &[u8],
) -> Result<()> {
    let mut attempt = 1;
    loop {
        match session.write_memory(at, block, None).await {
            Err(err @ T32Error::CallFailure { .. }) if attempt < MAX_ATTEMPTS => {
                warn!(address = %hex(at), attempt, error = %err, "write failed; retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Start of the block at `offset`, provided its last byte is addressable.
fn block_address(address: u64, offset: u64, len: usize) -> Result<u64> {
    address
        .checked_add(offset)
        .filter(|at| at.checked_add((len as u64).saturating_sub(1)).is_some())
        .ok_or(T32Error::AddressOverflow { address, offset })
}

fn hex(address: u64) -> String {
    format!("{address:#x}")
}

fn fill<R: Read + ?Sized>(source: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match source.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
