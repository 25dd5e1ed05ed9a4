//! Error types for library operations.
//!
//! Every fallible engine entry point returns [`LibraryError`]. Per-archive
//! parse failures never surface here during a scan; they are recorded on the
//! affected [`PackageRecord`](crate::PackageRecord) instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LibraryError>;

/// Errors raised by the library engine.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// A library root or archive could not be read.
    #[error("cannot access {path:?}: {source}")]
    Access {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not a readable package archive.
    #[error("malformed package {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// A lifecycle operation targeted a path outside the library root or a
    /// file without a package suffix.
    #[error("security violation: {path:?} is not a package within the active library {root:?}")]
    SecurityViolation { path: PathBuf, root: PathBuf },

    /// A destination collision that cannot be resolved automatically.
    #[error("conflict at {path:?}: {reason}")]
    Conflict { path: PathBuf, reason: String },

    /// Not enough free space on the target volume.
    #[error("insufficient disk space: need {needed} bytes, have {available} bytes available")]
    InsufficientSpace { needed: u64, available: u64 },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A filesystem mutation failed.
    #[error("failed to {op} {path:?}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Flat classification of [`LibraryError`] for foreign callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Access,
    Malformed,
    SecurityViolation,
    Conflict,
    InsufficientResource,
    Cancelled,
    Io,
}

impl LibraryError {
    pub(crate) fn access(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LibraryError::Access {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        LibraryError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn conflict(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        LibraryError::Conflict {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LibraryError::Access { .. } => ErrorKind::Access,
            LibraryError::Malformed { .. } => ErrorKind::Malformed,
            LibraryError::SecurityViolation { .. } => ErrorKind::SecurityViolation,
            LibraryError::Conflict { .. } => ErrorKind::Conflict,
            LibraryError::InsufficientSpace { .. } => ErrorKind::InsufficientResource,
            LibraryError::Cancelled => ErrorKind::Cancelled,
            LibraryError::Io { .. } => ErrorKind::Io,
        }
    }

    /// True when the error only reflects a user cancellation.
    ///
    /// UIs use this to suppress error notifications.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LibraryError::Cancelled)
    }
}
