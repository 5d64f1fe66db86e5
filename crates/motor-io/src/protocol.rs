use motor_core::{Command, Reading, SessionSnapshot, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const fn v1() -> Self {
        Self { major: 1, minor: 0 }
    }

    /// A missing version deserializes as 0.0 and is treated as v1.
    pub fn is_supported(&self) -> bool {
        self.major <= 1
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no \"type\" field")]
    MissingType,
    #[error("unknown message type {0:?}")]
    UnknownType(String),
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HelloMsg {
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommandMsg {
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub sequence: u64,
    pub command: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetEmergencyMsg {
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ControlMsg {
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    pub enabled: bool,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReadingMsg {
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(flatten)]
    pub reading: Reading,
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
}

#[derive(Debug)]
pub enum IncomingMessage {
    Hello(HelloMsg),
    Command(CommandMsg),
    ResetEmergency(ResetEmergencyMsg),
    Control(ControlMsg),
    Reading(ReadingMsg),
    History(HistoryRequest),
}

impl IncomingMessage {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let msg_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ParseError::MissingType)?
            .to_string();
        let msg = match msg_type.as_str() {
            "hello" => IncomingMessage::Hello(serde_json::from_value(value)?),
            "command" => IncomingMessage::Command(serde_json::from_value(value)?),
            "reset_emergency" => IncomingMessage::ResetEmergency(serde_json::from_value(value)?),
            "control" => IncomingMessage::Control(serde_json::from_value(value)?),
            "reading" => IncomingMessage::Reading(serde_json::from_value(value)?),
            "history" => IncomingMessage::History(serde_json::from_value(value)?),
            _ => return Err(ParseError::UnknownType(msg_type)),
        };
        Ok(msg)
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        match self {
            IncomingMessage::Hello(m) => m.protocol_version,
            IncomingMessage::Command(m) => m.protocol_version,
            IncomingMessage::ResetEmergency(m) => m.protocol_version,
            IncomingMessage::Control(m) => m.protocol_version,
            IncomingMessage::Reading(m) => m.protocol_version,
            IncomingMessage::History(m) => m.protocol_version,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Periodic frame: the session snapshot plus envelope fields.
#[derive(Debug, Serialize)]
pub struct StateMsg {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub protocol_version: ProtocolVersion,
    pub sequence: u64,
    pub timestamp_us: u64,
    pub unix_ms: u64,
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
}

impl StateMsg {
    pub fn new(sequence: u64, at: Timestamp, snapshot: SessionSnapshot) -> Self {
        Self {
            msg_type: "state",
            protocol_version: ProtocolVersion::v1(),
            sequence,
            timestamp_us: at.monotonic_us,
            unix_ms: at.unix_ms,
            snapshot,
        }
    }
}

/// Reply to `command`, `reset_emergency` and `control`.
#[derive(Debug, Serialize)]
pub struct AckMsg {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub protocol_version: ProtocolVersion,
    /// Inbound message type being acknowledged.
    pub request: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckMsg {
    pub fn accepted(request: &'static str, sequence: Option<u64>, command: Option<Command>) -> Self {
        Self {
            msg_type: "ack",
            protocol_version: ProtocolVersion::v1(),
            request,
            sequence,
            accepted: true,
            command,
            error: None,
        }
    }

    pub fn rejected(request: &'static str, sequence: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            msg_type: "ack",
            protocol_version: ProtocolVersion::v1(),
            request,
            sequence,
            accepted: false,
            command: None,
            error: Some(error.into()),
        }
    }
}

/// Most recent commands first.
#[derive(Debug, Serialize)]
pub struct HistoryMsg {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub protocol_version: ProtocolVersion,
    pub commands: Vec<Command>,
}

impl HistoryMsg {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            msg_type: "history",
            protocol_version: ProtocolVersion::v1(),
            commands,
        }
    }
}

/// Sent when an inbound line cannot be understood at all.
#[derive(Debug, Serialize)]
pub struct ErrorMsg {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub error: String,
}

impl ErrorMsg {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            msg_type: "error",
            error: error.into(),
        }
    }
}
