//! Media backend capability
//!
//! The orchestrator drives an external media server through [`MediaBackend`].
//! Implementations own the wire protocol and connection lifecycle; each method is
//! a single request/response round trip.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::{IceCandidate, PipelineRef};

/// Operation names used in [`BackendError::operation`]
pub mod ops {
    pub const CREATE_PIPELINE: &str = "CreatePipeline";
    pub const CREATE_ENDPOINT: &str = "CreateEndpoint";
    pub const CONNECT: &str = "Connect";
    pub const PROCESS_OFFER: &str = "ProcessOffer";
    pub const GATHER_CANDIDATES: &str = "GatherCandidates";
    pub const ADD_ICE_CANDIDATE: &str = "AddIceCandidate";
    pub const CREATE_RECORDER: &str = "CreateRecorder";
    pub const START_RECORDING: &str = "StartRecording";
    pub const RELEASE: &str = "Release";
}

/// Recorder element created inside a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorder {
    pub recorder_id: String,
    /// Location the backend will write the recording to
    pub uri: String,
}

/// Remote operations offered by the media server
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Create an empty pipeline and the backend session scoping it
    async fn create_pipeline(&self) -> Result<PipelineRef, BackendError>;

    /// Create a WebRTC endpoint inside `pipeline`, returning its id
    async fn create_endpoint(&self, pipeline: &PipelineRef) -> Result<String, BackendError>;

    /// Route media from `source` into `sink`
    async fn connect(
        &self,
        source: &str,
        sink: &str,
        backend_session_id: &str,
    ) -> Result<(), BackendError>;

    /// Negotiate `sdp_offer` on an endpoint, returning the SDP answer
    async fn process_offer(
        &self,
        endpoint_id: &str,
        backend_session_id: &str,
        sdp_offer: &str,
    ) -> Result<String, BackendError>;

    /// Start backend-side ICE gathering on an endpoint
    async fn gather_candidates(
        &self,
        endpoint_id: &str,
        backend_session_id: &str,
    ) -> Result<(), BackendError>;

    async fn add_ice_candidate(
        &self,
        endpoint_id: &str,
        backend_session_id: &str,
        candidate: &IceCandidate,
    ) -> Result<(), BackendError>;

    /// Create a recorder writing to (or near) `uri_hint`
    async fn create_recorder(
        &self,
        pipeline: &PipelineRef,
        uri_hint: &str,
    ) -> Result<Recorder, BackendError>;

    /// Start recording the stream of `sink_id` on `recorder_id`
    async fn start_recording(
        &self,
        recorder_id: &str,
        sink_id: &str,
        backend_session_id: &str,
    ) -> Result<(), BackendError>;

    /// Release a pipeline and every element in it
    async fn release(&self, pipeline: &PipelineRef) -> Result<(), BackendError>;
}
