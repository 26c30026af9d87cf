use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid path segment: {0}")]
    InvalidPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify a host IO error into the taxonomy, preserving it verbatim
    /// under [`Error::Io`] when no more specific member applies.
    ///
    /// `context` is the logical or physical path the error occurred on; it
    /// is folded into the specific variants so callers get a usable message
    /// without threading the path through separately.
    pub fn from_io(context: impl Into<String>, err: std::io::Error) -> Self {
        let context = context.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(context),
            std::io::ErrorKind::PermissionDenied => Error::Permission(context),
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(context),
            _ => Error::Io(err),
        }
    }

    /// True for the "source is a directory, not a file" signal that
    /// `materialize` switches on to fall back to directory materialization.
    /// Detected via `ErrorKind::IsADirectory` with a raw-errno fallback for
    /// platforms where that kind isn't classified by `std`.
    pub fn is_directory(err: &std::io::Error) -> bool {
        err.kind() == std::io::ErrorKind::IsADirectory || err.raw_os_error() == Some(21)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Clone this error for publishing to the other side of a shared
    /// in-flight slot (`MirrorTable`). `Io`'s inner `std::io::Error` isn't
    /// `Clone`, so it's reconstructed from its kind and message rather than
    /// degraded to a different variant — joiners need to observe the same
    /// variant the owner did (e.g. `is_not_found()`) to recover correctly.
    pub fn clone_for_join(&self) -> Error {
        match self {
            Error::InvalidPath(s) => Error::InvalidPath(s.clone()),
            Error::NotFound(s) => Error::NotFound(s.clone()),
            Error::AlreadyExists(s) => Error::AlreadyExists(s.clone()),
            Error::Permission(s) => Error::Permission(s.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }

    /// Unwrap a shared, joined-on outcome back into an owned `Error`.
    pub fn from_joined(shared: Arc<Error>) -> Error {
        shared.clone_for_join()
    }
}
