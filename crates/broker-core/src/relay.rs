//! Signaling relay
//!
//! Reads one connection's inbound frames, dispatches each to the broker and
//! applies the error policy:
//!
//! - not-found and invalid-state failures are answered with an `error` message;
//! - protocol and backend failures end the connection loop;
//! - unknown message kinds and everything else are logged and skipped.
//!
//! When the loop ends for any reason the identity registered on the connection
//! is disconnected.

use std::fmt;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::broker::CallBroker;
use crate::channel::MessageChannel;
use crate::error::Result;
use crate::protocol::{parse_inbound, ClientMessage, Inbound, ServerMessage};

/// Per-connection state seen by the relay
#[derive(Debug)]
pub struct ConnectionContext {
    pub channel: Arc<dyn MessageChannel>,
    /// Identity registered on this connection, if any
    pub identity: Option<String>,
}

impl ConnectionContext {
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            channel,
            identity: None,
        }
    }
}

#[derive(Clone)]
pub struct SignalingRelay {
    broker: Arc<CallBroker>,
}

impl SignalingRelay {
    pub fn new(broker: Arc<CallBroker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<CallBroker> {
        &self.broker
    }

    /// Handle one inbound text frame
    pub async fn dispatch(&self, ctx: &mut ConnectionContext, text: &str) -> Result<()> {
        let message = match parse_inbound(text)? {
            Inbound::Message(message) => message,
            Inbound::Unknown(kind) => {
                warn!(connection = %ctx.channel.connection_id(), "Ignoring unknown message kind {}", kind);
                return Ok(());
            }
        };
        debug!(connection = %ctx.channel.connection_id(), "Received {}", message.kind());

        match message {
            ClientMessage::Register { name, role } => {
                if let Some(previous) = ctx.identity.take().filter(|p| *p != name) {
                    self.broker
                        .disconnect(&previous, ctx.channel.connection_id())
                        .await?;
                }
                self.broker.register(&name, role, ctx.channel.clone()).await?;
                ctx.identity = Some(name);
                Ok(())
            }
            ClientMessage::Call { from, to, sdp_offer } => {
                self.broker.place_call(&from, sdp_offer, to.as_deref()).await
            }
            ClientMessage::IncomingCallResponse {
                from,
                to,
                call_response,
                sdp_offer,
            } => {
                self.broker
                    .accept_call(&from, &to, call_response, sdp_offer)
                    .await
            }
            ClientMessage::Stop { name } => self.broker.hang_up(&name).await.map(|_| ()),
            ClientMessage::OnIceCandidate { from, candidate } => {
                self.broker.on_ice_candidate(&from, candidate).await
            }
        }
    }

    /// Process `inbound` until it ends, a fatal error occurs or `channel` closes.
    ///
    /// Returns the error that ended the loop, if any.
    pub async fn run<S, E>(&self, channel: Arc<dyn MessageChannel>, inbound: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<String, E>> + Send,
        E: fmt::Display,
    {
        let connection = channel.connection_id();
        let mut ctx = ConnectionContext::new(channel);
        let mut outcome = Ok(());
        futures::pin_mut!(inbound);

        while let Some(frame) = inbound.next().await {
            let text = match frame {
                Ok(text) => text,
                Err(e) => {
                    info!(connection = %connection, "Inbound stream failed: {}", e);
                    break;
                }
            };

            match self.dispatch(&mut ctx, &text).await {
                Ok(()) => {}
                Err(e) if e.is_reportable() => {
                    debug!(connection = %connection, "Request failed: {}", e);
                    if ctx.channel.send(ServerMessage::error(e.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(e) if e.is_connection_fatal() => {
                    error!(connection = %connection, "Closing connection: {}", e);
                    outcome = Err(e);
                    break;
                }
                Err(e) => warn!(connection = %connection, "{}", e),
            }
        }

        if let Some(identity) = ctx.identity.take() {
            if let Err(e) = self.broker.disconnect(&identity, connection).await {
                warn!("Disconnect of {} failed: {}", identity, e);
            }
        }
        debug!(connection = %connection, "Connection loop finished");
        outcome
    }
}
