use std::collections::HashMap;

use chatline_proto::{
    ChatMessage, LoginStatus, MessageId, OutgoingMessage, PresenceUpdate, SendReceipt, ServerEvent,
};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc::UnboundedSender, Mutex};
use tracing::{debug, info, warn};

/// Push handle for one connected client. The connection task owns the
/// receiving end and copies each frame onto the socket.
pub type ClientHandle = UnboundedSender<String>;

/// Everything the server remembers, behind one lock: who it has seen, who
/// is connected right now, the full message history, and the sends parked
/// for later delivery. All of it is in memory; a restart starts clean.
pub struct AppState {
    chat: Mutex<ChatState>,
}

#[derive(Default)]
struct ChatState {
    users: HashMap<String, bool>,
    connections: HashMap<String, ClientHandle>,
    history: Vec<ChatMessage>,
    scheduled: Vec<ScheduledSend>,
}

struct ScheduledSend {
    sender: String,
    body: String,
    receivers: Vec<String>,
    due: DateTime<Utc>,
}

/// A username is 1..=32 visible characters after trimming surrounding
/// whitespace. Returns the trimmed name.
pub fn validate_username(raw: &str) -> Option<&str> {
    let name = raw.trim();
    let length = name.chars().count();
    if length == 0 || length > 32 {
        return None;
    }
    if name.chars().any(char::is_control) {
        return None;
    }
    Some(name)
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            chat: Mutex::new(ChatState::default()),
        }
    }

    /// Claims a username for a connection. On success the user is marked
    /// online, everyone else hears `user_logged_in`, and the accepted
    /// (trimmed) name comes back for the connection to remember.
    pub async fn log_in(&self, raw: &str, handle: ClientHandle) -> Result<String, LoginStatus> {
        let Some(name) = validate_username(raw) else {
            return Err(LoginStatus::BadUsername);
        };
        let mut chat = self.chat.lock().await;
        if chat.connections.contains_key(name) {
            return Err(LoginStatus::AlreadyLoggedIn);
        }
        chat.connections.insert(name.to_owned(), handle);
        chat.users.insert(name.to_owned(), true);
        chat.broadcast_except(&ServerEvent::UserLoggedIn(name.to_owned()), name);
        info!(username = %name, "logged in");
        Ok(name.to_owned())
    }

    /// Drops the connection's registration and marks the user offline. The
    /// user stays in the roster so clients keep showing them as offline.
    pub async fn log_out(&self, username: &str) {
        let mut chat = self.chat.lock().await;
        if chat.connections.remove(username).is_none() {
            return;
        }
        chat.users.insert(username.to_owned(), false);
        chat.broadcast_except(&ServerEvent::UserLoggedOut(username.to_owned()), username);
        info!(%username, "logged out");
    }

    /// History as `username` is allowed to see it: messages addressed to
    /// them, to everyone, or sent by them.
    pub async fn visible_history(&self, username: &str) -> Vec<ChatMessage> {
        let chat = self.chat.lock().await;
        chat.history
            .iter()
            .filter(|message| message.visible_to(username))
            .cloned()
            .collect()
    }

    pub async fn roster(&self) -> Vec<PresenceUpdate> {
        let chat = self.chat.lock().await;
        let mut roster: Vec<PresenceUpdate> = chat
            .users
            .iter()
            .map(|(username, online)| PresenceUpdate {
                username: username.clone(),
                online: *online,
            })
            .collect();
        roster.sort_by(|a, b| a.username.cmp(&b.username));
        roster
    }

    /// Stamps, stores, and fans out an immediate send. The sender is
    /// skipped during fan-out; the returned receipt is their copy.
    pub async fn deliver(&self, sender: &str, outgoing: OutgoingMessage) -> SendReceipt {
        let mut chat = self.chat.lock().await;
        let message = chat.append(sender, outgoing.body, outgoing.receivers.unwrap_or_default());
        chat.fan_out(&message, Some(sender));
        debug!(id = message.id.0, %sender, "message delivered");
        SendReceipt {
            id: message.id,
            timestamp: message.timestamp,
        }
    }

    /// Parks a send until its instant passes. Nothing is stamped yet; the
    /// id and timestamp are assigned when it fires.
    pub async fn park(&self, sender: &str, body: String, receivers: Vec<String>, due: DateTime<Utc>) {
        let mut chat = self.chat.lock().await;
        chat.scheduled.push(ScheduledSend {
            sender: sender.to_owned(),
            body,
            receivers,
            due,
        });
        debug!(%sender, %due, "message parked for later delivery");
    }

    /// Promotes every parked send whose instant has passed into a real
    /// message. The sender is not skipped here: their copy arrives as an
    /// ordinary push, since no receipt exists for a fired send. Returns how
    /// many fired.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let mut chat = self.chat.lock().await;
        let parked = std::mem::take(&mut chat.scheduled);
        let (due, pending): (Vec<_>, Vec<_>) = parked.into_iter().partition(|send| send.due <= now);
        chat.scheduled = pending;

        let fired = due.len();
        for send in due {
            let message = chat.append(&send.sender, send.body, send.receivers);
            chat.fan_out(&message, None);
        }
        fired
    }

    pub async fn scheduled_count(&self) -> usize {
        self.chat.lock().await.scheduled.len()
    }
}

impl ChatState {
    fn append(&mut self, sender: &str, body: String, receivers: Vec<String>) -> ChatMessage {
        let message = ChatMessage {
            id: MessageId(self.history.len() as i64 + 1),
            sender: sender.to_owned(),
            receivers,
            timestamp: Utc::now(),
            body,
        };
        self.history.push(message.clone());
        message
    }

    /// Pushes `message` to every online user allowed to see it. `skip`
    /// names a user who already holds a copy.
    fn fan_out(&self, message: &ChatMessage, skip: Option<&str>) {
        let text = match ServerEvent::NewMessage(message.clone()).to_json() {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "failed to encode message push");
                return;
            }
        };
        for (username, handle) in &self.connections {
            if skip == Some(username.as_str()) {
                continue;
            }
            if !message.visible_to(username) {
                continue;
            }
            let _ = handle.send(text.clone());
        }
    }

    fn broadcast_except(&self, event: &ServerEvent, except: &str) {
        let text = match event.to_json() {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "failed to encode broadcast");
                return;
            }
        };
        for (username, handle) in &self.connections {
            if username == except {
                continue;
            }
            let _ = handle.send(text.clone());
        }
    }
}
