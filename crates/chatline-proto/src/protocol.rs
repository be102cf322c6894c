use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{ChatMessage, LoginStatus, PresenceUpdate, SendReceipt},
    error::ProtocolError,
};

/// The unit every frame carries in both directions: a kind string plus a
/// kind-specific payload. `data` defaults to null so bare-kind frames parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Client-to-server frames. Serializes straight into the envelope shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    LogIn(String),
    SendMessage(OutgoingMessage),
}

/// Payload of `send_message`. A `timestamp` asks the server to hold the
/// message and deliver it at that instant instead of immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receivers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Server-to-client frames, decoded from [`Envelope`]. The kind table is
/// closed; anything else lands in `Unknown` and is ignored downstream, so a
/// newer server cannot break an older client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    LoginStatus(LoginStatus),
    Users(Vec<PresenceUpdate>),
    UserLoggedIn(String),
    UserLoggedOut(String),
    MessageHistory(Vec<ChatMessage>),
    NewMessage(ChatMessage),
    SendSuccess(SendReceipt),
    ScheduleSuccess,
    SendFail(String),
    Unknown { kind: String },
}

impl ServerEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)?;
        Self::decode(envelope)
    }

    pub fn decode(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope { kind, data } = envelope;
        let event = match kind.as_str() {
            "login_status" => Self::LoginStatus(payload(&kind, data)?),
            "users" => Self::Users(payload(&kind, data)?),
            "user_logged_in" => Self::UserLoggedIn(payload(&kind, data)?),
            "user_logged_out" => Self::UserLoggedOut(payload(&kind, data)?),
            "message_history" => Self::MessageHistory(payload(&kind, data)?),
            "new_message" => Self::NewMessage(payload(&kind, data)?),
            "send_success" => Self::SendSuccess(payload(&kind, data)?),
            // The payload is an empty string on the wire; nothing in it matters.
            "schedule_success" => Self::ScheduleSuccess,
            "send_fail" => Self::SendFail(match data {
                Value::String(reason) => reason,
                other => other.to_string(),
            }),
            _ => Self::Unknown { kind },
        };
        Ok(event)
    }

    pub fn encode(&self) -> serde_json::Result<Envelope> {
        let (kind, data) = match self {
            Self::LoginStatus(status) => ("login_status", serde_json::to_value(status)?),
            Self::Users(users) => ("users", serde_json::to_value(users)?),
            Self::UserLoggedIn(username) => ("user_logged_in", Value::String(username.clone())),
            Self::UserLoggedOut(username) => ("user_logged_out", Value::String(username.clone())),
            Self::MessageHistory(messages) => ("message_history", serde_json::to_value(messages)?),
            Self::NewMessage(message) => ("new_message", serde_json::to_value(message)?),
            Self::SendSuccess(receipt) => ("send_success", serde_json::to_value(receipt)?),
            Self::ScheduleSuccess => ("schedule_success", Value::String(String::new())),
            Self::SendFail(reason) => ("send_fail", Value::String(reason.clone())),
            Self::Unknown { kind } => (kind.as_str(), Value::Null),
        };
        Ok(Envelope {
            kind: kind.to_owned(),
            data,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.encode()?)
    }
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::BadPayload {
        kind: kind.to_owned(),
        source,
    })
}
