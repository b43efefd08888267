//! Pid file guarding against two servers sharing a data directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PidFileError;

/// A pid file owned by this process. The file is removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`.
    ///
    /// An existing file is overwritten unless it names a process that is
    /// still running (`/proc/{pid}` exists).
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, PidFileError> {
        let path = path.into();

        if let Some(pid) = read_pid(&path) {
            if process_alive(pid) {
                return Err(PidFileError::AlreadyRunning { path, pid });
            }
            debug!(pid = pid, path = %path.display(), "Replacing stale pid file");
        }

        fs::write(&path, std::process::id().to_string())
            .map_err(|source| PidFileError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Error removing {}: {}", self.path.display(), e);
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}
