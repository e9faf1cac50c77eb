//! Error types for the tailing library.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for tail operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The watched path could not be converted to an absolute path.
    #[error("failed to resolve absolute path for {path}: {source}")]
    PathResolution {
        path: PathBuf,
        source: std::io::Error,
    },

    /// File watching errors from the notify crate.
    #[error("file watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Opening the watched file failed with something other than NotFound.
    /// NotFound is retried internally and never surfaces.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// I/O errors while reading, seeking, or stat-ing an open file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pathname of an open file could not be recovered after a rename.
    #[error("failed to resolve the path of an open file: {0}")]
    FdPathResolve(std::io::Error),
}

/// A convenient Result type for tail operations.
pub type Result<T> = std::result::Result<T, Error>;
