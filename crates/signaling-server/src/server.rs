//! HTTP surface of the broker
//!
//! Routes:
//! - `GET {call_path}`: WebSocket upgrade for signaling connections
//! - `GET /stats`: broker counters as JSON
//! - `GET /health`: liveness probe

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use callbroker_core::{BrokerStats, CallBroker, MediaBackend, RecordingNotifier, SignalingRelay};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::record_store::HttpRecordStore;
use crate::ws::ws_handler;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) relay: SignalingRelay,
}

struct Running {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// Signaling server owning one [`CallBroker`]
pub struct SignalingServer {
    config: ServerConfig,
    backend: Arc<dyn MediaBackend>,
    broker: Arc<CallBroker>,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    running: Option<Running>,
}

impl SignalingServer {
    /// Validate `config` and build the broker.
    ///
    /// When `record_store_url` is set, finished recordings are reported to it.
    pub fn new(config: ServerConfig, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        config.validate()?;

        let mut broker = CallBroker::new(config.broker.clone(), backend.clone());
        if let Some(url) = &config.record_store_url {
            info!("Reporting recordings to {}", url);
            broker = broker.with_notifier(Arc::new(HttpRecordStore::new(url)?));
        }

        Ok(Self {
            config,
            backend,
            broker: Arc::new(broker),
            listener: None,
            local_addr: None,
            running: None,
        })
    }

    /// Report recordings to `notifier` instead of the configured record store.
    ///
    /// Replaces the broker, so call it before [`SignalingServer::serve`].
    pub fn with_notifier(mut self, notifier: Arc<dyn RecordingNotifier>) -> Self {
        let broker = CallBroker::new(self.config.broker.clone(), self.backend.clone())
            .with_notifier(notifier);
        self.broker = Arc::new(broker);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn broker(&self) -> &Arc<CallBroker> {
        &self.broker
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            relay: SignalingRelay::new(self.broker.clone()),
        };

        let router = Router::new()
            .route(&self.config.call_path, get(ws_handler))
            .route("/stats", get(stats_handler))
            .route("/health", get(|| async { "ok" }))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Bind the listener without serving yet
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr {
            return Ok(addr);
        }

        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;
        self.listener = Some(listener);
        self.local_addr = Some(addr);
        Ok(addr)
    }

    /// Start serving in the background, binding first if needed
    pub async fn serve(&mut self) -> Result<SocketAddr> {
        let addr = self.bind().await?;
        let Some(listener) = self.listener.take() else {
            return Ok(addr);
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let router = self.router();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(
            "Signaling server listening on {} (calls at {})",
            addr, self.config.call_path
        );
        self.running = Some(Running { shutdown_tx, task });
        Ok(addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Stop accepting connections and wait for the server task to finish
    pub async fn shutdown(&mut self) -> Result<()> {
        let Running { shutdown_tx, task } = self.running.take().ok_or(ServerError::NotRunning)?;
        let _ = shutdown_tx.send(());

        match task.await {
            Ok(Ok(())) => {
                info!("Signaling server stopped");
                self.local_addr = None;
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Signaling server failed: {}", e);
                Err(ServerError::Io(e))
            }
            Err(e) => Err(ServerError::Task(e.to_string())),
        }
    }
}

async fn stats_handler(State(state): State<AppState>) -> Json<BrokerStats> {
    Json(state.relay.broker().stats().await)
}
