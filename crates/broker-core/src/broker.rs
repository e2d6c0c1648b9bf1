//! Call broker facade
//!
//! [`CallBroker`] owns the shared [`BrokerState`] and the
//! [`PipelineOrchestrator`], and exposes every operation the signaling relay
//! dispatches to.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::MediaBackend;
use crate::channel::MessageChannel;
use crate::config::BrokerConfig;
use crate::error::Result;
use crate::matcher::{self, MatchOutcome};
use crate::pipeline::{CallSummary, PipelineOrchestrator};
use crate::protocol::ServerMessage;
use crate::recording::{RecordingDispatcher, RecordingNotifier};
use crate::session::{BrokerState, BrokerStats, DetachedCall, UserSession};
use crate::types::{CallResponse, ConnectionId, IceCandidate, Role};

pub struct CallBroker {
    state: Arc<Mutex<BrokerState>>,
    orchestrator: PipelineOrchestrator,
}

impl CallBroker {
    pub fn new(config: BrokerConfig, backend: Arc<dyn MediaBackend>) -> Self {
        let state = Arc::new(Mutex::new(BrokerState::new()));
        let orchestrator = PipelineOrchestrator::new(state.clone(), backend, config);
        Self {
            state,
            orchestrator,
        }
    }

    /// Report finished recordings to `notifier`, retrying per the notify policy
    pub fn with_notifier(mut self, notifier: Arc<dyn RecordingNotifier>) -> Self {
        let policy = self.orchestrator.config().notify.clone();
        self.orchestrator = self
            .orchestrator
            .with_dispatcher(RecordingDispatcher::new(notifier, policy));
        self
    }

    pub fn config(&self) -> &BrokerConfig {
        self.orchestrator.config()
    }

    /// Register `identity`, replacing any previous session under it.
    ///
    /// A call held by the replaced session is torn down first. Failing to
    /// deliver the acknowledgment is logged and does not undo the registration.
    pub async fn register(
        &self,
        identity: &str,
        role: Role,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<()> {
        let displaced = {
            let mut state = self.state.lock().await;
            let displaced = state.detach_call(identity);
            state.candidates.clear(identity);
            state.endpoints.unbind(identity);
            if let Some(previous) =
                state
                    .sessions
                    .insert(UserSession::new(identity, role, channel.clone()))
            {
                debug!(
                    "Replaced session of {} from {}",
                    identity,
                    previous.connection_id()
                );
            }
            displaced
        };
        info!(role = %role, connection = %channel.connection_id(), "Registered {}", identity);

        if let Some(detached) = displaced {
            self.finish_teardown(detached).await;
        }

        if let Err(e) = channel.send(ServerMessage::register_accepted()).await {
            warn!("Could not acknowledge registration of {}: {}", identity, e);
        }
        Ok(())
    }

    /// Snapshot of the session registered under `identity`
    pub async fn lookup(&self, identity: &str) -> Result<UserSession> {
        let state = self.state.lock().await;
        state.sessions.lookup(identity).cloned()
    }

    /// Tear down any call of `identity` and drop its session.
    ///
    /// Returns whether a session was removed.
    pub async fn remove(&self, identity: &str) -> Result<bool> {
        self.evict(identity, None).await
    }

    /// Like [`CallBroker::remove`], but only if `identity` is still registered
    /// from `connection`. A newer registration under the same identity is kept.
    pub async fn disconnect(&self, identity: &str, connection: ConnectionId) -> Result<bool> {
        self.evict(identity, Some(connection)).await
    }

    async fn evict(&self, identity: &str, connection: Option<ConnectionId>) -> Result<bool> {
        let detached = {
            let mut state = self.state.lock().await;
            let owned = match state.sessions.get(identity) {
                Some(session) => connection.map_or(true, |c| session.connection_id() == c),
                None => false,
            };
            if !owned {
                return Ok(false);
            }
            let detached = state.detach_call(identity);
            state.release_party(identity);
            state.sessions.remove(identity);
            detached
        };
        info!("Removed session of {}", identity);

        if let Some(detached) = detached {
            self.orchestrator.complete_teardown(detached).await?;
        }
        Ok(true)
    }

    /// Match `caller` with an idle operator, or `to` if given
    pub async fn place_call(&self, caller: &str, sdp_offer: String, to: Option<&str>) -> Result<()> {
        let outcome = {
            let mut state = self.state.lock().await;
            matcher::place_call(&mut state, caller, sdp_offer, to)?
        };

        match outcome {
            MatchOutcome::Matched {
                call_id,
                operator,
                operator_channel,
            } => {
                info!(call_id = %call_id, "Ringing {} for call from {}", operator, caller);
                let notice = ServerMessage::IncomingCall {
                    from: caller.to_string(),
                    to: operator.clone(),
                };
                if let Err(e) = operator_channel.send(notice).await {
                    warn!("Operator {} unreachable: {}", operator, e);
                    let detached = self.state.lock().await.detach_call(&operator);
                    if let Some(detached) = detached {
                        self.finish_teardown(detached).await;
                    }
                }
            }
            MatchOutcome::NoOperator { caller_channel } => {
                info!("No operator available for {}", caller);
                if let Err(e) = caller_channel.send(ServerMessage::AllAdminsAreBusy).await {
                    warn!("Could not tell {} that all operators are busy: {}", caller, e);
                }
            }
        }
        Ok(())
    }

    /// Handle the answer to a ringing call
    pub async fn accept_call(
        &self,
        caller: &str,
        operator: &str,
        response: CallResponse,
        sdp_offer: Option<String>,
    ) -> Result<()> {
        self.orchestrator
            .accept_call(caller, operator, response, sdp_offer)
            .await
    }

    pub async fn on_ice_candidate(&self, identity: &str, candidate: IceCandidate) -> Result<()> {
        self.orchestrator.on_ice_candidate(identity, candidate).await
    }

    /// End the call `identity` is part of
    pub async fn hang_up(&self, identity: &str) -> Result<Option<CallSummary>> {
        self.orchestrator.teardown(identity).await
    }

    pub async fn stats(&self) -> BrokerStats {
        self.state.lock().await.stats()
    }

    async fn finish_teardown(&self, detached: DetachedCall) {
        let initiator = detached.initiator.clone();
        if let Err(e) = self.orchestrator.complete_teardown(detached).await {
            warn!("Teardown after {} left failed: {}", initiator, e);
        }
    }
}
