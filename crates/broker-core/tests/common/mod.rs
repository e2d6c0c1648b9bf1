//! Shared fixtures for broker integration tests
//!
//! `FakeBackend` records every media operation in order and can be told to fail,
//! stall or pause on a chosen one. `CollectingChannel` keeps every outbound
//! message and can be closed to simulate a vanished peer.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use callbroker_core::backend::{ops, MediaBackend, Recorder};
use callbroker_core::{
    BackendError, BrokerConfig, CallBroker, ChannelError, ConnectionId, IceCandidate,
    MessageChannel, PipelineRef, Role, ServerMessage,
};

/// One recorded backend request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreatePipeline,
    CreateEndpoint { pipeline_id: String },
    Connect { source: String, sink: String },
    ProcessOffer { endpoint_id: String, sdp_offer: String },
    GatherCandidates { endpoint_id: String },
    AddIceCandidate { endpoint_id: String, candidate: String },
    CreateRecorder { uri_hint: String },
    StartRecording { recorder_id: String, sink_id: String },
    Release { pipeline_id: String },
}

impl BackendCall {
    pub fn operation(&self) -> &'static str {
        match self {
            BackendCall::CreatePipeline => ops::CREATE_PIPELINE,
            BackendCall::CreateEndpoint { .. } => ops::CREATE_ENDPOINT,
            BackendCall::Connect { .. } => ops::CONNECT,
            BackendCall::ProcessOffer { .. } => ops::PROCESS_OFFER,
            BackendCall::GatherCandidates { .. } => ops::GATHER_CANDIDATES,
            BackendCall::AddIceCandidate { .. } => ops::ADD_ICE_CANDIDATE,
            BackendCall::CreateRecorder { .. } => ops::CREATE_RECORDER,
            BackendCall::StartRecording { .. } => ops::START_RECORDING,
            BackendCall::Release { .. } => ops::RELEASE,
        }
    }
}

/// Pauses the first request for one operation until released
pub struct Gate {
    operation: &'static str,
    pub entered: Notify,
    release: Semaphore,
}

impl Gate {
    pub fn open(&self) {
        self.release.add_permits(1);
    }
}

#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<BackendCall>>,
    next_id: AtomicU32,
    fail_on: Mutex<Option<&'static str>>,
    stall_on: Mutex<Option<&'static str>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every request for `operation` fail
    pub fn fail_on(&self, operation: &'static str) {
        *self.fail_on.lock().unwrap() = Some(operation);
    }

    /// Make every request for `operation` hang forever
    pub fn stall_on(&self, operation: &'static str) {
        *self.stall_on.lock().unwrap() = Some(operation);
    }

    /// Pause the next request for `operation` until [`Gate::open`]
    pub fn gate_on(&self, operation: &'static str) -> Arc<Gate> {
        let gate = Arc::new(Gate {
            operation,
            entered: Notify::new(),
            release: Semaphore::new(0),
        });
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.calls().iter().map(BackendCall::operation).collect()
    }

    /// Candidates forwarded to `endpoint_id`, in order
    pub fn candidates_for(&self, endpoint_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::AddIceCandidate {
                    endpoint_id: ep,
                    candidate,
                } if ep == endpoint_id => Some(candidate),
                _ => None,
            })
            .collect()
    }

    pub fn released(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Release { pipeline_id } => Some(pipeline_id),
                _ => None,
            })
            .collect()
    }

    fn id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn enter(&self, call: BackendCall) -> Result<(), BackendError> {
        let operation = call.operation();
        self.calls.lock().unwrap().push(call);

        let gate = {
            let mut slot = self.gate.lock().unwrap();
            match slot.as_ref() {
                Some(gate) if gate.operation == operation => slot.take(),
                _ => None,
            }
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.acquire().await.unwrap().forget();
        }

        if *self.stall_on.lock().unwrap() == Some(operation) {
            std::future::pending::<()>().await;
        }
        if *self.fail_on.lock().unwrap() == Some(operation) {
            return Err(BackendError::failed(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn create_pipeline(&self) -> Result<PipelineRef, BackendError> {
        self.enter(BackendCall::CreatePipeline).await?;
        let id = self.id("pipeline");
        Ok(PipelineRef {
            backend_session_id: id.replace("pipeline", "session"),
            pipeline_id: id,
        })
    }

    async fn create_endpoint(&self, pipeline: &PipelineRef) -> Result<String, BackendError> {
        self.enter(BackendCall::CreateEndpoint {
            pipeline_id: pipeline.pipeline_id.clone(),
        })
        .await?;
        Ok(self.id("endpoint"))
    }

    async fn connect(&self, source: &str, sink: &str, _sid: &str) -> Result<(), BackendError> {
        self.enter(BackendCall::Connect {
            source: source.to_string(),
            sink: sink.to_string(),
        })
        .await
    }

    async fn process_offer(
        &self,
        endpoint_id: &str,
        _sid: &str,
        sdp_offer: &str,
    ) -> Result<String, BackendError> {
        self.enter(BackendCall::ProcessOffer {
            endpoint_id: endpoint_id.to_string(),
            sdp_offer: sdp_offer.to_string(),
        })
        .await?;
        Ok(format!("answer-to-{}", sdp_offer))
    }

    async fn gather_candidates(&self, endpoint_id: &str, _sid: &str) -> Result<(), BackendError> {
        self.enter(BackendCall::GatherCandidates {
            endpoint_id: endpoint_id.to_string(),
        })
        .await
    }

    async fn add_ice_candidate(
        &self,
        endpoint_id: &str,
        _sid: &str,
        candidate: &IceCandidate,
    ) -> Result<(), BackendError> {
        self.enter(BackendCall::AddIceCandidate {
            endpoint_id: endpoint_id.to_string(),
            candidate: candidate.candidate.clone(),
        })
        .await
    }

    async fn create_recorder(
        &self,
        _pipeline: &PipelineRef,
        uri_hint: &str,
    ) -> Result<Recorder, BackendError> {
        self.enter(BackendCall::CreateRecorder {
            uri_hint: uri_hint.to_string(),
        })
        .await?;
        Ok(Recorder {
            recorder_id: self.id("recorder"),
            uri: uri_hint.to_string(),
        })
    }

    async fn start_recording(
        &self,
        recorder_id: &str,
        sink_id: &str,
        _sid: &str,
    ) -> Result<(), BackendError> {
        self.enter(BackendCall::StartRecording {
            recorder_id: recorder_id.to_string(),
            sink_id: sink_id.to_string(),
        })
        .await
    }

    async fn release(&self, pipeline: &PipelineRef) -> Result<(), BackendError> {
        self.enter(BackendCall::Release {
            pipeline_id: pipeline.pipeline_id.clone(),
        })
        .await
    }
}

/// Channel that keeps every message it is given
#[derive(Debug)]
pub struct CollectingChannel {
    id: ConnectionId,
    messages: Mutex<Vec<ServerMessage>>,
    closed: AtomicBool,
}

impl CollectingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            messages: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Fail every later send
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<ServerMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.messages().iter().map(ServerMessage::kind).collect()
    }

    pub fn last(&self) -> Option<ServerMessage> {
        self.messages().last().cloned()
    }
}

#[async_trait]
impl MessageChannel for CollectingChannel {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, message: ServerMessage) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed(self.id));
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

pub fn broker(backend: &Arc<FakeBackend>) -> CallBroker {
    broker_with(backend, BrokerConfig::default())
}

pub fn broker_with(backend: &Arc<FakeBackend>, config: BrokerConfig) -> CallBroker {
    CallBroker::new(config, backend.clone())
}

/// Register `identity` on a fresh collecting channel
pub async fn join(broker: &CallBroker, identity: &str, role: Role) -> Arc<CollectingChannel> {
    let channel = CollectingChannel::new();
    broker
        .register(identity, role, channel.clone())
        .await
        .unwrap();
    channel
}
