//! Error types for the call broker
//!
//! The broker distinguishes four families of failure, each with its own
//! propagation rule in the signaling relay:
//!
//! - **Protocol**: an inbound message could not be parsed. The connection is closed.
//! - **NotFound / InvalidState**: a request referenced an unknown identity or a call
//!   in the wrong phase. Reported back to the sender as an `error` message.
//! - **Backend**: a media backend operation failed or timed out. Pipeline setup is
//!   rolled back and the connection loop that issued the request ends.
//! - **ChannelSend**: a peer's channel refused a message. Treated as that peer
//!   hanging up.

use std::time::Duration;

use thiserror::Error;

use crate::types::{CallId, ConnectionId};

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors raised by the call broker
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Malformed or unparseable inbound message
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Referenced identity has no registered session
    #[error("User not found: {identity}")]
    NotFound { identity: String },

    /// Request does not fit the current call phase
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Media backend operation failed
    #[error("Media backend error: {0}")]
    Backend(#[from] BackendError),

    /// Delivery to a user's channel failed
    #[error("Channel error: {0}")]
    ChannelSend(#[from] ChannelError),

    /// The pairing a pipeline was being built for ended before setup finished
    #[error("Call {call_id} ended while its media pipeline was being built")]
    CallAbandoned { call_id: CallId },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl BrokerError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(identity: impl Into<String>) -> Self {
        Self::NotFound {
            identity: identity.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a call-abandoned error
    pub fn abandoned(call_id: CallId) -> Self {
        Self::CallAbandoned { call_id }
    }

    /// Whether the connection that triggered this error must stop processing
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Backend(_))
    }

    /// Whether this error should be answered on the sender's channel
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::InvalidState { .. })
    }
}

/// Failure of a single media backend operation
#[derive(Debug, Clone, Error)]
#[error("{operation} failed: {kind}")]
pub struct BackendError {
    /// Name of the backend operation, e.g. `CreateEndpoint`
    pub operation: &'static str,
    pub kind: BackendErrorKind,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendErrorKind {
    #[error("{0}")]
    Failed(String),

    #[error("no response within {0:?}")]
    TimedOut(Duration),
}

impl BackendError {
    pub fn failed(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind: BackendErrorKind::Failed(message.into()),
        }
    }

    pub fn timed_out(operation: &'static str, after: Duration) -> Self {
        Self {
            operation,
            kind: BackendErrorKind::TimedOut(after),
        }
    }
}

/// A message could not be delivered to a user's channel
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("channel {0} is closed")]
    Closed(ConnectionId),
}

/// The external record store refused or failed a notification
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("record store request failed: {0}")]
    Transport(String),

    #[error("record store rejected notification with status {0}")]
    Rejected(u16),
}
