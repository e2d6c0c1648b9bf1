//! Signaling protocol messages
//!
//! Every message is a JSON object whose `id` field names its kind. Inbound kinds
//! the broker does not know are surfaced as [`Inbound::Unknown`] so the relay can
//! log and skip them; anything that is not a JSON object with a string `id` is a
//! protocol error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BrokerError, Result};
use crate::types::{CallResponse, IceCandidate, Role};

/// Messages sent by browsers to the broker
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ClientMessage {
    Register {
        name: String,
        role: Role,
    },
    Call {
        from: String,
        /// Optional operator to dial directly instead of matching
        #[serde(default)]
        to: Option<String>,
        #[serde(rename = "sdpOffer")]
        sdp_offer: String,
    },
    IncomingCallResponse {
        /// The party that placed the call
        from: String,
        /// The party answering it
        to: String,
        #[serde(rename = "callResponse")]
        call_response: CallResponse,
        #[serde(rename = "sdpOffer", default)]
        sdp_offer: Option<String>,
    },
    Stop {
        name: String,
    },
    OnIceCandidate {
        from: String,
        candidate: IceCandidate,
    },
}

impl ClientMessage {
    const KINDS: [&'static str; 5] = [
        "register",
        "call",
        "incomingCallResponse",
        "stop",
        "onIceCandidate",
    ];

    /// Wire name of this message kind
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "register",
            ClientMessage::Call { .. } => "call",
            ClientMessage::IncomingCallResponse { .. } => "incomingCallResponse",
            ClientMessage::Stop { .. } => "stop",
            ClientMessage::OnIceCandidate { .. } => "onIceCandidate",
        }
    }
}

/// Result of parsing one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ClientMessage),
    /// Well-formed frame with a kind the broker ignores
    Unknown(String),
}

/// Parse one inbound text frame
pub fn parse_inbound(text: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| BrokerError::protocol(format!("invalid JSON: {}", e)))?;

    let kind = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| BrokerError::protocol("message has no string `id`"))?
        .to_string();

    if !ClientMessage::KINDS.contains(&kind.as_str()) {
        return Ok(Inbound::Unknown(kind));
    }

    serde_json::from_value(value)
        .map(Inbound::Message)
        .map_err(|e| BrokerError::protocol(format!("malformed `{}` message: {}", kind, e)))
}

/// Messages sent by the broker to browsers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ServerMessage {
    RegisterResponse {
        response: String,
    },
    IncomingCall {
        from: String,
        to: String,
    },
    /// No operator is free to take the call
    AllAdminsAreBusy,
    CallResponse {
        response: String,
        #[serde(rename = "sdpAnswer", skip_serializing_if = "Option::is_none")]
        sdp_answer: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    StartCommunication {
        #[serde(rename = "sdpAnswer")]
        sdp_answer: String,
    },
    StopCommunication {
        message: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn register_accepted() -> Self {
        ServerMessage::RegisterResponse {
            response: "accepted".to_string(),
        }
    }

    pub fn call_accepted(sdp_answer: String) -> Self {
        ServerMessage::CallResponse {
            response: "accepted".to_string(),
            sdp_answer: Some(sdp_answer),
            message: None,
        }
    }

    pub fn call_rejected(message: impl Into<String>) -> Self {
        ServerMessage::CallResponse {
            response: "rejected".to_string(),
            sdp_answer: None,
            message: Some(message.into()),
        }
    }

    pub fn stop_communication(message: impl Into<String>) -> Self {
        ServerMessage::StopCommunication {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Wire name of this message kind
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::RegisterResponse { .. } => "registerResponse",
            ServerMessage::IncomingCall { .. } => "incomingCall",
            ServerMessage::AllAdminsAreBusy => "allAdminsAreBusy",
            ServerMessage::CallResponse { .. } => "callResponse",
            ServerMessage::StartCommunication { .. } => "startCommunication",
            ServerMessage::StopCommunication { .. } => "stopCommunication",
            ServerMessage::Error { .. } => "error",
        }
    }

    /// Encode as a JSON text frame
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
