// src/error.rs

//! Error types for the arcade library

use std::io;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by ingestion, the bundle store, the remote mirror and sync
#[derive(Error, Debug)]
pub enum Error {
    /// The uploaded bytes are not a readable zip container
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// An untrusted relative path resolves outside its root
    #[error("Path traversal rejected: {0}")]
    PathTraversal(String),

    /// A path that is malformed for reasons other than traversal
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A string that does not parse as a bundle identifier
    #[error("Invalid bundle id: {0}")]
    InvalidBundleId(String),

    /// Bundle, asset or remote object absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient failure talking to the remote object store
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// A bundle directory that must be created exactly once already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local disk failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the failure may succeed on a later attempt without any
    /// change on the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::RemoteUnavailable(_) | Error::Io(_))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            other => Error::InvalidArchive(other.to_string()),
        }
    }
}
