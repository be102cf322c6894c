use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

/// A chat message as the server stores and pushes it. `id` and `timestamp`
/// are always server-assigned; clients never invent either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender: String,
    /// Empty means addressed to everyone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub receivers: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub body: String,
}

impl ChatMessage {
    /// Whether `username` is among the addressees. An unrestricted message
    /// addresses every user.
    pub fn is_receiver(&self, username: &str) -> bool {
        self.receivers.is_empty() || self.receivers.iter().any(|r| r == username)
    }

    /// Receivers see a message, and so does its sender.
    pub fn visible_to(&self, username: &str) -> bool {
        self.is_receiver(username) || self.sender == username
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub username: String,
    pub online: bool,
}

/// Payload of `send_success`: the identity and instant the server assigned
/// to a just-delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub id: MessageId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    Ok,
    BadUsername,
    AlreadyLoggedIn,
}
