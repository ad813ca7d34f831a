// src/output/fifo.rs

//! Named-pipe [`PipeSource`] backed by a FIFO in the session work directory.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::debug;

use crate::errors::{Result, T32Error};
use crate::output::PipeSource;

const FIFO_NAME: &str = "area.fifo";

#[derive(Debug)]
pub struct FifoPipe {
    path: PathBuf,
    file: File,
}

impl FifoPipe {
    /// Create the FIFO inside `dir` and open it for non-blocking reads.
    pub fn create(dir: &Path) -> Result<Self> {
        let path = dir.join(FIFO_NAME);
        mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| {
            T32Error::IoError(std::io::Error::other(format!(
                "creating fifo {}: {errno}",
                path.display()
            )))
        })?;

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path)?;

        debug!(path = %path.display(), "output fifo ready");
        Ok(Self { path, file })
    }
}

impl PipeSource for FifoPipe {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_available(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max];
        loop {
            match self.file.read(&mut buf) {
                // Zero means no writer has the FIFO open at the moment.
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(buf);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Vec::new()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn reads_what_a_writer_appended() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipe = FifoPipe::create(dir.path()).unwrap();
        assert!(pipe.read_available(64).unwrap().is_empty());

        let mut writer = OpenOptions::new().append(true).open(pipe.path()).unwrap();
        writer.write_all(b"B::PRINT done\n").unwrap();

        assert_eq!(pipe.read_available(64).unwrap(), b"B::PRINT done\n");
        assert!(pipe.read_available(64).unwrap().is_empty());
    }
}
