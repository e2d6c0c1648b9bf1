//! Shared helpers for server tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use callbroker_core::backend::{MediaBackend, Recorder};
use callbroker_core::{BackendError, IceCandidate, PipelineRef};
use callbroker_server::{ServerConfig, SignalingServer};

/// Backend that succeeds at everything and counts releases
#[derive(Default)]
pub struct EchoBackend {
    next_id: AtomicU32,
    pub released: Mutex<Vec<String>>,
}

impl EchoBackend {
    fn id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl MediaBackend for EchoBackend {
    async fn create_pipeline(&self) -> Result<PipelineRef, BackendError> {
        Ok(PipelineRef {
            pipeline_id: self.id("pipeline"),
            backend_session_id: "session".to_string(),
        })
    }

    async fn create_endpoint(&self, _pipeline: &PipelineRef) -> Result<String, BackendError> {
        Ok(self.id("endpoint"))
    }

    async fn connect(&self, _source: &str, _sink: &str, _sid: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn process_offer(
        &self,
        _endpoint_id: &str,
        _sid: &str,
        sdp_offer: &str,
    ) -> Result<String, BackendError> {
        Ok(format!("answer-to-{}", sdp_offer))
    }

    async fn gather_candidates(&self, _endpoint_id: &str, _sid: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        _endpoint_id: &str,
        _sid: &str,
        _candidate: &IceCandidate,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    async fn create_recorder(
        &self,
        _pipeline: &PipelineRef,
        uri_hint: &str,
    ) -> Result<Recorder, BackendError> {
        Ok(Recorder {
            recorder_id: self.id("recorder"),
            uri: uri_hint.to_string(),
        })
    }

    async fn start_recording(
        &self,
        _recorder_id: &str,
        _sink_id: &str,
        _sid: &str,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    async fn release(&self, pipeline: &PipelineRef) -> Result<(), BackendError> {
        self.released
            .lock()
            .unwrap()
            .push(pipeline.pipeline_id.clone());
        Ok(())
    }
}

pub fn local_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..Default::default()
    }
}

/// Start a server on an ephemeral port
pub async fn start_server(backend: Arc<EchoBackend>) -> anyhow::Result<SignalingServer> {
    let mut server = SignalingServer::new(local_config(), backend)?;
    server.serve().await?;
    Ok(server)
}

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect(server: &SignalingServer) -> anyhow::Result<Client> {
    let addr = server.local_addr().expect("server is bound");
    let url = format!("ws://{}{}", addr, server.config().call_path);
    let (client, _) = connect_async(url).await?;
    Ok(client)
}

pub async fn send(client: &mut Client, message: Value) -> anyhow::Result<()> {
    client.send(Message::text(message.to_string())).await?;
    Ok(())
}

/// Next JSON text frame from the server
pub async fn recv(client: &mut Client) -> anyhow::Result<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
        if let Message::Text(text) = frame {
            return Ok(serde_json::from_str(text.as_str())?);
        }
    }
}

/// Wait until the server-side session count reaches `expected`
pub async fn wait_for_registered(server: &SignalingServer, expected: usize) {
    for _ in 0..100 {
        if server.broker().stats().await.registered == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} registered sessions", expected);
}
