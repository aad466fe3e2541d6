//! Scratch-file staging for engines that load from paths.
//!
//! Each blob handed to an engine is written to its own uniquely named file in
//! the configured scratch directory. The file lives exactly as long as its
//! [`StagedArtifact`]: dropping it (on success or on any error path) deletes it.

use crate::error::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};
use tracing::debug;

/// Directory where staged artifacts are created
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Use `root` as scratch space, creating it if needed
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` to a fresh uniquely named file.
    ///
    /// Names are `<label>-<random><suffix>`; concurrent callers never share a path.
    pub fn stage(&self, label: &str, suffix: &str, bytes: &[u8]) -> Result<StagedArtifact> {
        let mut file = Builder::new()
            .prefix(&format!("{label}-"))
            .suffix(suffix)
            .rand_bytes(12)
            .tempfile_in(&self.root)?;
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.into_temp_path();
        debug!(artifact = %path.display(), bytes = bytes.len(), "Staged artifact");
        Ok(StagedArtifact { path })
    }
}

/// A staged file, deleted when dropped
#[derive(Debug)]
pub struct StagedArtifact {
    path: TempPath,
}

impl StagedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }
}
