//! Error types for hotspot-core

use thiserror::Error;

/// Result type alias for hotspot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the access-point HTTP responder
#[derive(Debug, Error)]
pub enum Error {
    /// Formatted output would not fit its fixed buffer
    #[error("Buffer too small: {required} bytes needed, capacity is {capacity}")]
    BufferTooSmall { required: usize, capacity: usize },

    /// No room for another session
    #[error("Session limit reached: {limit} sessions in use")]
    SessionLimit { limit: usize },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Listening socket could not be opened (native only)
    #[cfg(feature = "native")]
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// IO error (native only)
    #[cfg(feature = "native")]
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
