//! Session registry
//!
//! Maps a user identity to its [`UserSession`]. The registry itself is a plain
//! map; callers reach it through the broker's state lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::channel::MessageChannel;
use crate::error::{BrokerError, Result};
use crate::types::{CallId, CallPhase, ConnectionId, PipelineRef, Role};

/// Everything the broker knows about one registered user
#[derive(Debug, Clone)]
pub struct UserSession {
    pub identity: String,
    pub role: Role,
    /// The other party of the current call
    pub peer: Option<String>,
    pub phase: CallPhase,
    pub call_id: Option<CallId>,
    /// Most recent SDP offer, held until the call is accepted or rejected
    pub pending_sdp_offer: Option<String>,
    pub pipeline: Option<PipelineRef>,
    pub recording_location: Option<String>,
    pub channel: Arc<dyn MessageChannel>,
    pub registered_at: DateTime<Utc>,
}

impl UserSession {
    pub fn new(identity: impl Into<String>, role: Role, channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            identity: identity.into(),
            role,
            peer: None,
            phase: CallPhase::Idle,
            call_id: None,
            pending_sdp_offer: None,
            pipeline: None,
            recording_location: None,
            channel,
            registered_at: Utc::now(),
        }
    }

    /// True while bound to a ringing, connecting or active call
    pub fn is_busy(&self) -> bool {
        self.phase != CallPhase::Idle
    }

    pub fn is_idle_operator(&self) -> bool {
        self.role == Role::Operator && !self.is_busy()
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.channel.connection_id()
    }

    /// Whether this session is still part of the pairing `call_id` with `peer`
    pub fn in_call(&self, call_id: CallId, peer: &str) -> bool {
        self.call_id == Some(call_id) && self.peer.as_deref() == Some(peer)
    }

    pub(crate) fn bind_call(&mut self, peer: &str, call_id: CallId) {
        self.peer = Some(peer.to_string());
        self.call_id = Some(call_id);
        self.phase = CallPhase::Ringing;
    }

    /// Return every call-scoped field to its idle value
    pub(crate) fn reset_call(&mut self) {
        self.peer = None;
        self.call_id = None;
        self.phase = CallPhase::Idle;
        self.pending_sdp_offer = None;
        self.pipeline = None;
        self.recording_location = None;
    }
}

/// Identity-keyed store of user sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, UserSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session`, replacing and returning any previous session under its identity
    pub fn insert(&mut self, session: UserSession) -> Option<UserSession> {
        self.sessions.insert(session.identity.clone(), session)
    }

    pub fn get(&self, identity: &str) -> Option<&UserSession> {
        self.sessions.get(identity)
    }

    pub fn get_mut(&mut self, identity: &str) -> Option<&mut UserSession> {
        self.sessions.get_mut(identity)
    }

    pub fn lookup(&self, identity: &str) -> Result<&UserSession> {
        self.get(identity).ok_or_else(|| BrokerError::not_found(identity))
    }

    pub fn lookup_mut(&mut self, identity: &str) -> Result<&mut UserSession> {
        self.sessions
            .get_mut(identity)
            .ok_or_else(|| BrokerError::not_found(identity))
    }

    pub fn remove(&mut self, identity: &str) -> Option<UserSession> {
        self.sessions.remove(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.sessions.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserSession> {
        self.sessions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::QueuedChannel;

    fn session(identity: &str, role: Role) -> UserSession {
        let (channel, _rx) = QueuedChannel::new();
        UserSession::new(identity, role, Arc::new(channel))
    }

    #[test]
    fn test_insert_replaces_previous_session() {
        let mut registry = SessionRegistry::new();
        let mut first = session("u1", Role::Caller);
        first.bind_call("op1", CallId::new());
        assert!(registry.insert(first).is_none());

        let replaced = registry.insert(session("u1", Role::Operator)).unwrap();
        assert!(replaced.is_busy());

        let current = registry.lookup("u1").unwrap();
        assert_eq!(current.role, Role::Operator);
        assert!(current.peer.is_none());
        assert!(!current.is_busy());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown_identity() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.lookup("ghost"),
            Err(BrokerError::NotFound { identity }) if identity == "ghost"
        ));
    }

    #[test]
    fn test_reset_call_clears_call_scope() {
        let mut s = session("u1", Role::Caller);
        let call_id = CallId::new();
        s.bind_call("op1", call_id);
        s.pending_sdp_offer = Some("offer".to_string());
        s.pipeline = Some(PipelineRef {
            pipeline_id: "p".to_string(),
            backend_session_id: "s".to_string(),
        });
        s.recording_location = Some("file:///r.webm".to_string());
        assert!(s.in_call(call_id, "op1"));

        s.reset_call();
        assert_eq!(s.phase, CallPhase::Idle);
        assert!(s.peer.is_none());
        assert!(s.call_id.is_none());
        assert!(s.pending_sdp_offer.is_none());
        assert!(s.pipeline.is_none());
        assert!(s.recording_location.is_none());
        assert!(!s.in_call(call_id, "op1"));
    }
}
