//! # Callbroker Core
//!
//! Call-signaling broker that matches callers with available operators, relays
//! WebRTC offers and ICE candidates between them, and drives an external media
//! server to build a recorded media pipeline for every accepted call.
//!
//! The crate is transport agnostic. A connection is a [`MessageChannel`] for
//! outbound messages plus a stream of inbound text frames handed to
//! [`SignalingRelay::run`]. The media server is reached through a
//! [`MediaBackend`] implementation supplied by the embedder.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use callbroker_core::prelude::*;
//!
//! # async fn example(backend: Arc<dyn MediaBackend>) -> Result<()> {
//! let broker = Arc::new(CallBroker::new(BrokerConfig::default(), backend));
//! let relay = SignalingRelay::new(broker.clone());
//!
//! let (channel, _outbound) = QueuedChannel::new();
//! let inbound = futures::stream::iter(vec![Ok::<_, std::io::Error>(
//!     r#"{"id":"register","name":"op1","role":"operator"}"#.to_string(),
//! )]);
//! relay.run(Arc::new(channel), inbound).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod broker;
pub mod channel;
pub mod config;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod protocol;
pub mod recording;
pub mod relay;
pub mod session;
pub mod types;

pub use backend::{MediaBackend, Recorder};
pub use broker::CallBroker;
pub use channel::{MessageChannel, QueuedChannel};
pub use config::{BrokerConfig, NotifyConfig, RecordingConfig, RecordingSource};
pub use error::{BackendError, BackendErrorKind, BrokerError, ChannelError, NotifyError, Result};
pub use pipeline::{CallSummary, PipelineOrchestrator};
pub use protocol::{ClientMessage, Inbound, ServerMessage};
pub use recording::{RecordingDispatcher, RecordingNotice, RecordingNotifier};
pub use relay::{ConnectionContext, SignalingRelay};
pub use session::{BrokerStats, UserSession};
pub use types::{CallId, CallPhase, CallResponse, ConnectionId, IceCandidate, PipelineRef, Role};

/// Re-export of common types
pub mod prelude {
    pub use super::{
        BrokerConfig, BrokerError, CallBroker, CallResponse, IceCandidate, MediaBackend,
        MessageChannel, QueuedChannel, Result, Role, ServerMessage, SignalingRelay,
    };
}
