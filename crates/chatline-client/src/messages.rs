use std::collections::HashMap;

use chatline_proto::{ChatMessage, MessageId};

/// Local copy of the conversation, keyed by server-assigned id. History
/// batches and live pushes both land here; replaying either is harmless
/// because an id always names the same logical message. The ordered view
/// is rebuilt lazily after a mutation.
#[derive(Debug, Default)]
pub struct MessageStore {
    by_id: HashMap<MessageId, ChatMessage>,
    ordered: Option<Vec<ChatMessage>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_one(&mut self, message: ChatMessage) {
        self.by_id.insert(message.id, message);
        self.ordered = None;
    }

    pub fn apply_history(&mut self, batch: impl IntoIterator<Item = ChatMessage>) {
        for message in batch {
            self.by_id.insert(message.id, message);
        }
        self.ordered = None;
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.by_id.get(&id)
    }

    /// Chronological view, oldest first. Equal timestamps fall back to the
    /// id, which follows server assignment order, so the ordering is total
    /// and stable across rebuilds.
    pub fn snapshot(&mut self) -> &[ChatMessage] {
        if self.ordered.is_none() {
            let mut ordered: Vec<ChatMessage> = self.by_id.values().cloned().collect();
            ordered.sort_by_key(|message| (message.timestamp, message.id));
            self.ordered = Some(ordered);
        }
        self.ordered.as_deref().unwrap_or(&[])
    }
}
