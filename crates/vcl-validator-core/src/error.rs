//! Error types for vcl-validator-core

use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the HTTP server core
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Route already registered for this method
    #[error("Duplicate route: {method} {path}")]
    DuplicateRoute { method: String, path: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
