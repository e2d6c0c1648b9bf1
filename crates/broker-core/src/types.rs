//! Shared identifiers and value types

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role a user registers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Answers calls; eligible for matching while idle
    #[serde(rename = "operator", alias = "admin")]
    Operator,
    /// Places calls
    #[serde(rename = "caller", alias = "user")]
    Caller,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Operator => write!(f, "operator"),
            Role::Caller => write!(f, "caller"),
        }
    }
}

/// Answer to an incoming call. Anything other than `accept` rejects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CallResponse {
    Accept,
    Reject(String),
}

impl From<String> for CallResponse {
    fn from(value: String) -> Self {
        if value == "accept" {
            CallResponse::Accept
        } else {
            CallResponse::Reject(value)
        }
    }
}

impl From<CallResponse> for String {
    fn from(value: CallResponse) -> Self {
        match value {
            CallResponse::Accept => "accept".to_string(),
            CallResponse::Reject(raw) => raw,
        }
    }
}

/// Identifies one pairing of caller and operator, from ringing to teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocate a process-unique connection id
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a session is in the call lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPhase {
    Idle,
    /// Matched; operator notified, waiting for an answer
    Ringing,
    /// Accepted; media pipeline under construction
    Connecting,
    /// Pipeline built and both parties answered
    Active,
}

/// Backend-side handle for a constructed pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineRef {
    pub pipeline_id: String,
    pub backend_session_id: String,
}

/// ICE candidate as sent by a browser.
///
/// The well-known fields are typed; anything else the client includes is kept
/// in `extra` and forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,

    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            extra: serde_json::Map::new(),
        }
    }
}
