//! Shared session state
//!
//! The session registry, candidate buffer and endpoint directory are kept
//! together in [`BrokerState`] and guarded by one lock, so every
//! read-decide-mutate sequence over them is atomic.

pub mod candidates;
pub mod endpoints;
pub mod registry;

use std::sync::Arc;

use serde::Serialize;

pub use candidates::CandidateBuffer;
pub use endpoints::{EndpointBinding, EndpointDirectory};
pub use registry::{SessionRegistry, UserSession};

use crate::channel::MessageChannel;
use crate::types::{CallId, CallPhase, PipelineRef, Role};

/// All mutable broker state
#[derive(Debug, Default)]
pub struct BrokerState {
    pub sessions: SessionRegistry,
    pub candidates: CandidateBuffer,
    pub endpoints: EndpointDirectory,
}

/// Call-scoped state removed from both parties by [`BrokerState::detach_call`]
#[derive(Debug, Clone)]
pub struct DetachedCall {
    pub call_id: Option<CallId>,
    /// The party whose action ended the call
    pub initiator: String,
    pub peer: String,
    /// Channel of the peer, if the peer still pointed back at the initiator
    pub peer_channel: Option<Arc<dyn MessageChannel>>,
    pub pipeline: Option<PipelineRef>,
    pub recording_location: Option<String>,
    /// Whichever identity held the operator role in the pairing
    pub operator: String,
    /// The other party
    pub caller: String,
}

/// Point-in-time counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub registered: usize,
    pub operators: usize,
    pub idle_operators: usize,
    pub ringing_calls: usize,
    pub active_calls: usize,
    pub buffered_candidates: usize,
}

impl BrokerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `a` and `b` are still paired with each other under `call_id`
    pub fn is_paired(&self, a: &str, b: &str, call_id: CallId) -> bool {
        let a_ok = self
            .sessions
            .get(a)
            .map_or(false, |s| s.in_call(call_id, b));
        let b_ok = self
            .sessions
            .get(b)
            .map_or(false, |s| s.in_call(call_id, a));
        a_ok && b_ok
    }

    /// Reset one party to idle and drop its buffered candidates and endpoint
    pub fn release_party(&mut self, identity: &str) {
        if let Some(session) = self.sessions.get_mut(identity) {
            session.reset_call();
        }
        self.candidates.clear(identity);
        self.endpoints.unbind(identity);
    }

    /// Unpair `identity` from its peer and reset both sides.
    ///
    /// Returns `None` when `identity` is unknown or not in a call. The peer is only
    /// reset if it still belongs to the same call.
    pub fn detach_call(&mut self, identity: &str) -> Option<DetachedCall> {
        let session = self.sessions.get(identity)?;
        let peer = session.peer.clone()?;
        let call_id = session.call_id;
        let pipeline = session.pipeline.clone();
        let recording_location = session.recording_location.clone();
        let own_role = session.role;

        let peer_session = self.sessions.get(&peer).filter(|p| {
            p.peer.as_deref() == Some(identity) && p.call_id == call_id
        });
        let peer_channel = peer_session.map(|p| p.channel.clone());
        let peer_role = peer_session.map(|p| p.role);
        let peer_pipeline = peer_session.and_then(|p| p.pipeline.clone());
        let peer_recording = peer_session.and_then(|p| p.recording_location.clone());

        let peer_is_operator = match peer_role {
            Some(role) => role == Role::Operator,
            None => own_role != Role::Operator,
        };
        let (operator, caller) = if peer_is_operator {
            (peer.clone(), identity.to_string())
        } else {
            (identity.to_string(), peer.clone())
        };

        self.release_party(identity);
        if peer_channel.is_some() {
            self.release_party(&peer);
        }

        Some(DetachedCall {
            call_id,
            initiator: identity.to_string(),
            peer,
            peer_channel,
            pipeline: pipeline.or(peer_pipeline),
            recording_location: recording_location.or(peer_recording),
            operator,
            caller,
        })
    }

    pub fn stats(&self) -> BrokerStats {
        let mut stats = BrokerStats {
            registered: self.sessions.len(),
            buffered_candidates: self.candidates.total(),
            ..Default::default()
        };

        let mut ringing_parties = 0;
        let mut active_parties = 0;
        for session in self.sessions.iter() {
            if session.role == Role::Operator {
                stats.operators += 1;
                if !session.is_busy() {
                    stats.idle_operators += 1;
                }
            }
            match session.phase {
                CallPhase::Ringing => ringing_parties += 1,
                CallPhase::Connecting | CallPhase::Active => active_parties += 1,
                CallPhase::Idle => {}
            }
        }
        stats.ringing_calls = ringing_parties / 2;
        stats.active_calls = active_parties / 2;
        stats
    }
}
