//! Staged file writes and spooled uploads.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::error::StoreError;

/// Content to store at a path.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// Bytes held in memory, written through a staging file
    Bytes(&'a [u8]),

    /// A fully written file inside the data directory, moved into place
    File(&'a Path),
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Payload::Bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Payload<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Payload::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Payload<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

/// Store `contents` at `path`, creating parent directories as needed.
///
/// In-memory bytes go to a dot-prefixed sibling first and are renamed over
/// the target, so readers never observe a partially written file. A spooled
/// file is renamed over the target directly. Concurrent writers to the same
/// path are not serialized; the last rename wins.
pub fn write_file<'a>(path: &Path, contents: impl Into<Payload<'a>>) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidName(path.display().to_string()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| StoreError::InvalidName(path.display().to_string()))?;

    fs::create_dir_all(parent).map_err(|e| StoreError::from_io(parent, e))?;

    let rename = |from: &Path| {
        fs::rename(from, path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    };

    let bytes = match contents.into() {
        Payload::Bytes(bytes) => bytes,
        Payload::File(source) => return rename(source),
    };

    let staging = parent.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    let result = write_staged(&staging, bytes).and_then(|()| rename(&staging));

    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

fn write_staged(staging: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let io_err = |e| StoreError::Io {
        path: staging.to_path_buf(),
        source: e,
    };
    let mut file = fs::File::create(staging).map_err(io_err)?;
    file.write_all(contents).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}

/// Whether a directory entry name is a staging file or other hidden entry.
///
/// Valid names never start with a dot, so this never hides stored content.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// A request body written to disk inside the data directory.
///
/// The file is deleted on drop unless it was moved into the store first.
#[derive(Debug)]
pub struct SpooledFile {
    path: PathBuf,
    len: u64,
}

impl SpooledFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, len: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written to the file.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set_len(&mut self, len: u64) {
        self.len = len;
    }

    pub fn payload(&self) -> Payload<'_> {
        Payload::File(&self.path)
    }
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Error removing {}: {}", self.path.display(), e),
        }
    }
}
