// src/session/workdir.rs

//! Per-session temporary directory holding the pipe and generated scripts.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

use crate::errors::Result;

/// Environment variables consulted for the temp base, in order.
const TEMP_VARS: [&str; 4] = ["TMPDIR", "TMP", "TEMP", "XDG_RUNTIME_DIR"];

#[derive(Debug)]
pub struct Workdir {
    dir: TempDir,
}

impl Workdir {
    /// Create a fresh directory under `base`, or under the first usable
    /// temp location from the environment.
    pub fn create(base: Option<&Path>) -> Result<Self> {
        let base = base.map(Path::to_path_buf).or_else(temp_base_from_env);
        let mut builder = tempfile::Builder::new();
        builder.prefix("t32ctl-");
        let dir = match base {
            Some(base) => builder.tempdir_in(base)?,
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "session workdir created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `text` to a new `.cmm` file. The file is removed when the
    /// returned handle is dropped.
    pub fn write_script(&self, text: &str) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("script-")
            .suffix(".cmm")
            .tempfile_in(self.path())?;
        file.write_all(text.trim_end().as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(file)
    }
}

fn temp_base_from_env() -> Option<PathBuf> {
    TEMP_VARS
        .iter()
        .filter_map(std::env::var_os)
        .map(PathBuf::from)
        .find(|path| path.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_live_inside_the_workdir() {
        let base = tempfile::tempdir().unwrap();
        let workdir = Workdir::create(Some(base.path())).unwrap();
        assert!(workdir.path().starts_with(base.path()));

        let script = workdir.write_script("PRINT \"hi\"\nENDDO\n\n").unwrap();
        assert!(script.path().starts_with(workdir.path()));
        assert_eq!(script.path().extension().unwrap(), "cmm");
        let text = std::fs::read_to_string(script.path()).unwrap();
        assert_eq!(text, "PRINT \"hi\"\nENDDO\n");
    }

    #[test]
    fn directory_is_removed_on_drop() {
        let workdir = Workdir::create(None).unwrap();
        let path = workdir.path().to_path_buf();
        assert!(path.is_dir());
        drop(workdir);
        assert!(!path.exists());
    }
}
