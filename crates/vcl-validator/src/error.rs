//! Startup and runtime errors for the service

use crate::sockets::SocketError;
use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors that stop the service
#[derive(Debug, Error)]
pub enum AppError {
    /// Server setup or serving failed
    #[error(transparent)]
    Server(#[from] vcl_validator_core::Error),

    /// Placeholder socket provisioning failed
    #[error(transparent)]
    Sockets(#[from] SocketError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
