//! WebSocket transport
//!
//! Each upgraded socket is split in two. A writer task drains the connection's
//! [`QueuedChannel`] into the sink; the read half becomes the inbound stream the
//! relay loop consumes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{future, SinkExt, StreamExt};
use tracing::{debug, info, warn};

use callbroker_core::{MessageChannel, QueuedChannel, SignalingRelay};

use crate::server::AppState;

/// How long queued messages may take to drain after the read side ends
const WRITER_DRAIN: Duration = Duration::from_secs(5);

pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

async fn handle_socket(socket: WebSocket, relay: SignalingRelay) {
    let (mut sink, stream) = socket.split();
    let (channel, mut outbound) = QueuedChannel::new();
    let connection = channel.connection_id();
    info!(connection = %connection, "WebSocket connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(connection = %connection, "Dropping unencodable {}: {}", message.kind(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });
    let writer_abort = writer.abort_handle();

    let inbound = stream
        .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });

    if let Err(e) = relay.run(Arc::new(channel), inbound).await {
        debug!(connection = %connection, "Relay ended with error: {}", e);
    }

    // Every sender is gone once the session is removed, which ends the writer
    if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        writer_abort.abort();
    }
    info!(connection = %connection, "WebSocket closed");
}
