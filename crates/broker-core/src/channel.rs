//! Outbound message channels
//!
//! The broker never touches sockets. Each connected user is represented by a
//! [`MessageChannel`]; the transport decides how queued messages reach the wire.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::protocol::ServerMessage;
use crate::types::ConnectionId;

/// Capability to deliver messages to one connected user
#[async_trait]
pub trait MessageChannel: Send + Sync + fmt::Debug {
    /// Connection this channel belongs to
    fn connection_id(&self) -> ConnectionId;

    /// Deliver a message. An error means the user can no longer be reached.
    async fn send(&self, message: ServerMessage) -> Result<(), ChannelError>;
}

/// Channel backed by an unbounded queue drained by a transport writer task
#[derive(Debug, Clone)]
pub struct QueuedChannel {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl QueuedChannel {
    /// Create a channel with a fresh connection id and the receiving end of its queue
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        Self::with_id(ConnectionId::next())
    }

    pub fn with_id(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl MessageChannel for QueuedChannel {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, message: ServerMessage) -> Result<(), ChannelError> {
        self.tx
            .send(message)
            .map_err(|_| ChannelError::Closed(self.id))
    }
}
