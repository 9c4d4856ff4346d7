//! Error types for Gatekeeper.

use thiserror::Error;

/// Main error type for Gatekeeper operations.
///
/// A denied request is not an error; see [`crate::ratelimit::Decision`].
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limiter options that cannot be used
    #[error("Invalid rate limit options: {0}")]
    InvalidOptions(String),

    /// Background work started without a tokio runtime
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for GatekeeperError {
    fn from(err: ::config::ConfigError) -> Self {
        GatekeeperError::Config(err.to_string())
    }
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
