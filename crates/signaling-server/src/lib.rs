//! # Callbroker Server
//!
//! WebSocket signaling surface for [`callbroker_core`]. Browsers connect to the
//! configured call path and exchange JSON signaling messages; the server adapts
//! every socket into a message channel and runs the broker's relay loop on it.
//!
//! The media server is reached through a [`MediaBackend`] supplied by the
//! embedder.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use callbroker_core::MediaBackend;
//! use callbroker_server::{setup_logging, ServerConfig, SignalingServer};
//!
//! # async fn example(backend: Arc<dyn MediaBackend>) -> callbroker_server::Result<()> {
//! let config = ServerConfig::from_env()?;
//! setup_logging(config.logging()?)?;
//!
//! let mut server = SignalingServer::new(config, backend)?;
//! let addr = server.serve().await?;
//! println!("listening on {}", addr);
//!
//! tokio::signal::ctrl_c().await?;
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod record_store;
pub mod server;
mod ws;

pub use callbroker_core::MediaBackend;
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use logging::{setup_logging, LoggingConfig};
pub use record_store::HttpRecordStore;
pub use server::SignalingServer;
