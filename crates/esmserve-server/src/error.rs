use std::net::SocketAddr;
use thiserror::Error;

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid listen address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("File watcher failed: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Core(#[from] esmserve_core::Error),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}
