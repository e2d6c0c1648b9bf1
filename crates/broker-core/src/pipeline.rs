//! Pipeline orchestration
//!
//! Builds the media path for an accepted call and tears it down again. Backend
//! round trips run strictly in sequence and never under the state lock; after
//! every step that commits state the pairing is re-checked by [`CallId`], so a
//! hang-up in the middle of setup aborts construction instead of resurrecting
//! the call.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{ops, MediaBackend, Recorder};
use crate::channel::MessageChannel;
use crate::config::{BrokerConfig, RecordingSource};
use crate::error::{BackendError, BrokerError, Result};
use crate::protocol::ServerMessage;
use crate::recording::{RecordingDispatcher, RecordingNotice};
use crate::session::{BrokerState, DetachedCall, EndpointBinding};
use crate::types::{CallId, CallPhase, CallResponse, IceCandidate, PipelineRef};

/// Message sent to the remaining party when its peer leaves the call
pub const REMOTE_HANGUP: &str = "remote user hung up";

/// Outcome of a completed teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSummary {
    pub call_id: Option<CallId>,
    /// Whichever identity held the operator role in the pairing
    pub operator: String,
    pub caller: String,
    pub recording_location: Option<String>,
}

/// One accepted call on its way to becoming active
struct CallSetup {
    call_id: CallId,
    caller: String,
    operator: String,
    caller_offer: String,
    operator_offer: String,
    /// Set as soon as the backend has created the pipeline
    pipeline: Option<PipelineRef>,
}

/// Answers produced by a fully built pipeline
struct BuiltPipeline {
    pipeline: PipelineRef,
    recording_location: String,
    caller_answer: String,
    operator_answer: String,
}

/// A committed call and the channels its answers go out on
struct ActiveCall {
    built: BuiltPipeline,
    caller_channel: Arc<dyn MessageChannel>,
    operator_channel: Arc<dyn MessageChannel>,
}

pub struct PipelineOrchestrator {
    state: Arc<Mutex<BrokerState>>,
    backend: Arc<dyn MediaBackend>,
    config: BrokerConfig,
    dispatcher: Option<RecordingDispatcher>,
}

impl PipelineOrchestrator {
    pub fn new(
        state: Arc<Mutex<BrokerState>>,
        backend: Arc<dyn MediaBackend>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            state,
            backend,
            config,
            dispatcher: None,
        }
    }

    /// Hand recording locations to `dispatcher` after each recorded call
    pub fn with_dispatcher(mut self, dispatcher: RecordingDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Handle the operator's answer to a ringing call
    pub async fn accept_call(
        &self,
        caller: &str,
        operator: &str,
        response: CallResponse,
        operator_offer: Option<String>,
    ) -> Result<()> {
        let operator_offer = match (&response, operator_offer) {
            (CallResponse::Accept, Some(offer)) => Some(offer),
            (CallResponse::Accept, None) => {
                return Err(BrokerError::protocol(
                    "accepting a call requires an sdpOffer",
                ))
            }
            (CallResponse::Reject(_), _) => None,
        };

        let mut state = self.state.lock().await;
        let call_id = Self::ringing_call(&state, caller, operator)?;

        let Some(operator_offer) = operator_offer else {
            state.release_party(caller);
            state.release_party(operator);
            let caller_channel = state.sessions.lookup(caller)?.channel.clone();
            drop(state);

            info!(call_id = %call_id, "Operator {} rejected call from {}", operator, caller);
            if let Err(e) = caller_channel
                .send(ServerMessage::call_rejected("user declined"))
                .await
            {
                debug!("Could not deliver rejection to {}: {}", caller, e);
            }
            return Ok(());
        };

        let caller_offer = {
            let caller_session = state.sessions.lookup_mut(caller)?;
            let offer = caller_session
                .pending_sdp_offer
                .clone()
                .ok_or_else(|| BrokerError::invalid_state(format!("{} has no pending offer", caller)))?;
            caller_session.phase = CallPhase::Connecting;
            offer
        };
        let operator_session = state.sessions.lookup_mut(operator)?;
        operator_session.phase = CallPhase::Connecting;
        operator_session.pending_sdp_offer = Some(operator_offer.clone());
        drop(state);

        info!(call_id = %call_id, "Operator {} accepted call from {}", operator, caller);
        let mut setup = CallSetup {
            call_id,
            caller: caller.to_string(),
            operator: operator.to_string(),
            caller_offer,
            operator_offer,
            pipeline: None,
        };

        let committed = match self.build_pipeline(&mut setup).await {
            Ok(built) => self.commit(&setup, built).await,
            Err(e) => Err(e),
        };
        match committed {
            Ok(active) => {
                self.deliver_answers(&setup, active).await;
                Ok(())
            }
            Err(e) => self.abort_setup(&setup, e).await,
        }
    }

    /// Identify the ringing call between `caller` and `operator`
    fn ringing_call(state: &BrokerState, caller: &str, operator: &str) -> Result<CallId> {
        let caller_session = state.sessions.lookup(caller)?;
        state.sessions.lookup(operator)?;

        let call_id = caller_session
            .call_id
            .filter(|id| state.is_paired(caller, operator, *id))
            .ok_or_else(|| {
                BrokerError::invalid_state(format!(
                    "no pending call between {} and {}",
                    caller, operator
                ))
            })?;

        if caller_session.phase != CallPhase::Ringing {
            return Err(BrokerError::invalid_state(format!(
                "call {} was already answered",
                call_id
            )));
        }
        Ok(call_id)
    }

    async fn build_pipeline(&self, setup: &mut CallSetup) -> Result<BuiltPipeline> {
        let backend = &self.backend;

        let pipeline = self
            .call(ops::CREATE_PIPELINE, backend.create_pipeline())
            .await?;
        setup.pipeline = Some(pipeline.clone());
        let sid = pipeline.backend_session_id.as_str();
        debug!(call_id = %setup.call_id, "Created pipeline {}", pipeline.pipeline_id);

        let caller_ep = self
            .call(ops::CREATE_ENDPOINT, backend.create_endpoint(&pipeline))
            .await?;
        self.attach_endpoint(setup, &setup.caller, &caller_ep, sid)
            .await?;

        let hint = self.config.recording.render_uri(
            &setup.call_id.to_string(),
            &setup.caller,
            &setup.operator,
            Utc::now().timestamp(),
        );
        let Recorder { recorder_id, uri } = self
            .call(ops::CREATE_RECORDER, backend.create_recorder(&pipeline, &hint))
            .await?;
        debug!(call_id = %setup.call_id, "Recorder {} writes to {}", recorder_id, uri);

        let operator_ep = self
            .call(ops::CREATE_ENDPOINT, backend.create_endpoint(&pipeline))
            .await?;
        self.attach_endpoint(setup, &setup.operator, &operator_ep, sid)
            .await?;

        let source_ep = match self.config.recording.source {
            RecordingSource::Operator => &operator_ep,
            RecordingSource::Caller => &caller_ep,
        };
        self.call(ops::CONNECT, backend.connect(&caller_ep, &operator_ep, sid))
            .await?;
        self.call(ops::CONNECT, backend.connect(&operator_ep, &caller_ep, sid))
            .await?;
        self.call(ops::CONNECT, backend.connect(source_ep, &recorder_id, sid))
            .await?;

        let caller_answer = self
            .call(
                ops::PROCESS_OFFER,
                backend.process_offer(&caller_ep, sid, &setup.caller_offer),
            )
            .await?;
        let operator_answer = self
            .call(
                ops::PROCESS_OFFER,
                backend.process_offer(&operator_ep, sid, &setup.operator_offer),
            )
            .await?;

        self.call(ops::GATHER_CANDIDATES, backend.gather_candidates(&caller_ep, sid))
            .await?;
        self.call(ops::GATHER_CANDIDATES, backend.gather_candidates(&operator_ep, sid))
            .await?;

        self.call(
            ops::START_RECORDING,
            backend.start_recording(&recorder_id, source_ep, sid),
        )
        .await?;

        Ok(BuiltPipeline {
            pipeline,
            recording_location: uri,
            caller_answer,
            operator_answer,
        })
    }

    /// Flush early candidates for `identity` into its new endpoint, then bind it.
    ///
    /// Candidates keep arriving while a batch is being forwarded, so the queue is
    /// drained until it is observed empty under the lock. Binding happens in that
    /// same lock scope; later candidates go straight to the endpoint.
    async fn attach_endpoint(
        &self,
        setup: &CallSetup,
        identity: &str,
        endpoint_id: &str,
        backend_session_id: &str,
    ) -> Result<()> {
        loop {
            let batch = {
                let mut state = self.state.lock().await;
                if !state.is_paired(&setup.caller, &setup.operator, setup.call_id) {
                    return Err(BrokerError::abandoned(setup.call_id));
                }
                let batch = state.candidates.take(identity);
                if batch.is_empty() {
                    state.endpoints.bind(
                        identity,
                        EndpointBinding {
                            endpoint_id: endpoint_id.to_string(),
                            backend_session_id: backend_session_id.to_string(),
                        },
                    );
                    return Ok(());
                }
                batch
            };

            debug!(
                "Flushing {} buffered candidates for {} into {}",
                batch.len(),
                identity,
                endpoint_id
            );
            for candidate in &batch {
                self.call(
                    ops::ADD_ICE_CANDIDATE,
                    self.backend
                        .add_ice_candidate(endpoint_id, backend_session_id, candidate),
                )
                .await?;
            }
        }
    }

    /// Persist the built pipeline onto both parties and mark the call active
    async fn commit(&self, setup: &CallSetup, built: BuiltPipeline) -> Result<ActiveCall> {
        let mut state = self.state.lock().await;
        if !state.is_paired(&setup.caller, &setup.operator, setup.call_id) {
            return Err(BrokerError::abandoned(setup.call_id));
        }

        for identity in [&setup.caller, &setup.operator] {
            let session = state.sessions.lookup_mut(identity)?;
            session.pipeline = Some(built.pipeline.clone());
            session.recording_location = Some(built.recording_location.clone());
            session.phase = CallPhase::Active;
            session.pending_sdp_offer = None;
        }

        Ok(ActiveCall {
            caller_channel: state.sessions.lookup(&setup.caller)?.channel.clone(),
            operator_channel: state.sessions.lookup(&setup.operator)?.channel.clone(),
            built,
        })
    }

    async fn deliver_answers(&self, setup: &CallSetup, active: ActiveCall) {
        let ActiveCall {
            built,
            caller_channel,
            operator_channel,
        } = active;
        info!(
            call_id = %setup.call_id,
            pipeline = %built.pipeline.pipeline_id,
            "Call between {} and {} is active",
            setup.caller,
            setup.operator
        );

        if let Err(e) = caller_channel
            .send(ServerMessage::call_accepted(built.caller_answer))
            .await
        {
            warn!("Caller {} unreachable after setup: {}", setup.caller, e);
            self.teardown_quietly(&setup.caller).await;
            return;
        }

        if let Err(e) = operator_channel
            .send(ServerMessage::StartCommunication {
                sdp_answer: built.operator_answer,
            })
            .await
        {
            warn!("Operator {} unreachable after setup: {}", setup.operator, e);
            self.teardown_quietly(&setup.operator).await;
        }
    }

    /// Undo a failed setup: release what was built and return both parties to idle
    async fn abort_setup(&self, setup: &CallSetup, error: BrokerError) -> Result<()> {
        if let Some(pipeline) = &setup.pipeline {
            if let Err(e) = self.call(ops::RELEASE, self.backend.release(pipeline)).await {
                warn!(
                    call_id = %setup.call_id,
                    "Failed to release pipeline {} after aborted setup: {}",
                    pipeline.pipeline_id, e
                );
            }
        }

        if matches!(error, BrokerError::CallAbandoned { .. }) {
            info!(call_id = %setup.call_id, "Call setup abandoned; a party left");
            return Err(error);
        }

        warn!(call_id = %setup.call_id, "Call setup failed: {}", error);
        let channels = {
            let mut state = self.state.lock().await;
            if !state.is_paired(&setup.caller, &setup.operator, setup.call_id) {
                None
            } else {
                state.release_party(&setup.caller);
                state.release_party(&setup.operator);
                let caller = state.sessions.get(&setup.caller).map(|s| s.channel.clone());
                let operator = state.sessions.get(&setup.operator).map(|s| s.channel.clone());
                Some((caller, operator))
            }
        };

        if let Some((caller_channel, operator_channel)) = channels {
            let message = format!("call setup failed: {}", error);
            if let Some(channel) = caller_channel {
                if let Err(e) = channel.send(ServerMessage::call_rejected(message.clone())).await {
                    debug!("Could not notify {} of failed setup: {}", setup.caller, e);
                }
            }
            if let Some(channel) = operator_channel {
                if let Err(e) = channel.send(ServerMessage::stop_communication(message)).await {
                    debug!("Could not notify {} of failed setup: {}", setup.operator, e);
                }
            }
        }
        Err(error)
    }

    /// Forward a candidate to its endpoint, or buffer it until one exists.
    ///
    /// A forward that fails because the call ended meanwhile is dropped, not
    /// reported: the endpoint it targeted is already released.
    pub async fn on_ice_candidate(&self, identity: &str, candidate: IceCandidate) -> Result<()> {
        let binding = {
            let mut state = self.state.lock().await;
            state.sessions.lookup(identity)?;
            match state.endpoints.get(identity) {
                Some(binding) => binding.clone(),
                None => {
                    if !state.candidates.push(identity, candidate) {
                        warn!("Candidate queue for {} is full; dropping candidate", identity);
                    }
                    return Ok(());
                }
            }
        };

        let forwarded = self
            .call(
                ops::ADD_ICE_CANDIDATE,
                self.backend.add_ice_candidate(
                    &binding.endpoint_id,
                    &binding.backend_session_id,
                    &candidate,
                ),
            )
            .await;

        match forwarded {
            Ok(()) => Ok(()),
            Err(e) => {
                let still_bound = self
                    .state
                    .lock()
                    .await
                    .endpoints
                    .get(identity)
                    .is_some_and(|current| *current == binding);
                if still_bound {
                    return Err(e.into());
                }
                debug!(
                    "Dropping candidate for {}: endpoint {} went away ({})",
                    identity, binding.endpoint_id, e
                );
                Ok(())
            }
        }
    }

    /// End the call `identity` is part of.
    ///
    /// Returns `None` if `identity` was not in a call.
    pub async fn teardown(&self, identity: &str) -> Result<Option<CallSummary>> {
        let detached = {
            let mut state = self.state.lock().await;
            state.sessions.lookup(identity)?;
            state.detach_call(identity)
        };
        match detached {
            Some(detached) => self.complete_teardown(detached).await.map(Some),
            None => Ok(None),
        }
    }

    /// Finish a teardown whose state was already detached under the lock
    pub async fn complete_teardown(&self, detached: DetachedCall) -> Result<CallSummary> {
        info!(
            call_id = ?detached.call_id,
            "{} left the call with {}",
            detached.initiator,
            detached.peer
        );

        if let Some(channel) = &detached.peer_channel {
            if let Err(e) = channel
                .send(ServerMessage::stop_communication(REMOTE_HANGUP))
                .await
            {
                debug!("Peer {} already gone: {}", detached.peer, e);
            }
        }

        if let Some(pipeline) = &detached.pipeline {
            self.call(ops::RELEASE, self.backend.release(pipeline))
                .await?;
            debug!("Released pipeline {}", pipeline.pipeline_id);
        }

        if let (Some(dispatcher), Some(location)) =
            (&self.dispatcher, &detached.recording_location)
        {
            dispatcher.dispatch(RecordingNotice {
                caller: detached.caller.clone(),
                operator: detached.operator.clone(),
                location: location.clone(),
            });
        }

        Ok(CallSummary {
            call_id: detached.call_id,
            operator: detached.operator,
            caller: detached.caller,
            recording_location: detached.recording_location,
        })
    }

    /// Teardown after a delivery failure; errors are only logged
    async fn teardown_quietly(&self, identity: &str) {
        match self.teardown(identity).await {
            Ok(_) => {}
            Err(e) => warn!("Teardown of {} failed: {}", identity, e),
        }
    }

    /// Run one backend operation under the configured timeout
    async fn call<T>(
        &self,
        operation: &'static str,
        request: impl Future<Output = std::result::Result<T, BackendError>>,
    ) -> std::result::Result<T, BackendError> {
        match self.config.backend_timeout() {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| BackendError::timed_out(operation, limit))?,
            None => request.await,
        }
    }
}
