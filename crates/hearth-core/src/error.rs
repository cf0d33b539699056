use std::io;

use thiserror::Error;

/// Failure surface of the filesystem sandbox. Every variant is an ordinary
/// return value for the guest to handle; none of them takes the scheduler
/// down.
#[derive(Debug, Error)]
pub enum FsError {
    /// The virtual path is malformed or escapes the sandbox root.
    #[error("{0}: Invalid path")]
    InvalidPath(String),

    /// Write or append under a read-only mount.
    #[error("{0}: Access denied")]
    PermissionDenied(String),

    /// The open-handle budget is spent.
    #[error("Too many files already open")]
    ResourceExhausted,

    #[error("{0}: No such file")]
    NotFound(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Maps a host I/O error onto the taxonomy, keeping the virtual path in
    /// the message.
    pub fn from_io(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied(path.to_string()),
            _ => FsError::Io {
                path: path.to_string(),
                source: err,
            },
        }
    }

    pub fn unsupported(path: &str, what: &str) -> Self {
        FsError::Io {
            path: path.to_string(),
            source: io::Error::new(io::ErrorKind::Unsupported, what.to_string()),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
