//! Error types for the signaling server

use thiserror::Error;

use callbroker_core::BrokerError;

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised while configuring or running the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// The record store client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server task failed: {0}")]
    Task(String),

    #[error("Server is not running")]
    NotRunning,
}

impl ServerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
