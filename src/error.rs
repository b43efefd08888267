use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the on-disk content store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing on disk matches the requested repository, image or file
    #[error("Not found: {0}")]
    NotFound(String),

    /// A path component name is empty, starts with a dot or could escape the data directory
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// The image attributes file is not valid JSON
    #[error("Invalid attributes for image {image}: {message}")]
    InvalidAttributes { image: String, message: String },

    /// The parent chain of an image revisits an id or points at a missing image
    #[error("Corrupt ancestry for image {image}: {reason}")]
    CorruptAncestry { image: String, reason: String },

    /// Underlying filesystem failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Wrap an I/O error, turning a missing file into `NotFound`.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.display().to_string())
        } else {
            StoreError::Io { path, source }
        }
    }

    /// Whether this error means the requested content does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum PidFileError {
    /// The pid file names a process that is still alive
    #[error(
        "pid file {} names running process {pid}; stop it or delete the file",
        path.display()
    )]
    AlreadyRunning { path: PathBuf, pid: u32 },

    /// The pid file could not be written or removed
    #[error("pid file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
