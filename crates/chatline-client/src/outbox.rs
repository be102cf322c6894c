use chatline_proto::{ChatMessage, ClientCommand, OutgoingMessage, SendReceipt};
use chrono::{DateTime, Timelike, Utc};
use tracing::debug;

use crate::{error::SendError, messages::MessageStore, session::Session};

/// A message the user has composed but the server has not yet resolved.
/// It stays out of the timeline until the outcome arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub body: String,
    /// `None` addresses everyone.
    pub receivers: Option<Vec<String>>,
    /// Set when the user asked for delivery at a later instant.
    pub schedule_at: Option<DateTime<Utc>>,
}

impl Draft {
    pub fn broadcast(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            receivers: None,
            schedule_at: None,
        }
    }
}

/// Server resolution of the pending draft.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Delivered(SendReceipt),
    Scheduled,
    Failed(String),
}

#[derive(Debug, Default)]
enum SendSlot {
    #[default]
    Idle,
    Pending(Draft),
}

/// Single-slot send coordinator. At most one send is in flight per
/// connection; the next one is accepted only after the server resolves the
/// current one.
#[derive(Debug, Default)]
pub struct Outbox {
    slot: SendSlot,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.slot, SendSlot::Pending(_))
    }

    /// Accepts `draft`, parks it in the slot, and returns the frame to
    /// transmit. Scheduled instants are truncated to the whole minute, the
    /// granularity the scheduling UI works in.
    pub fn begin_send(&mut self, draft: Draft, session: &Session) -> Result<ClientCommand, SendError> {
        if !session.is_authenticated() {
            return Err(SendError::NotAuthenticated);
        }
        if self.is_pending() {
            return Err(SendError::AlreadyPending);
        }
        let command = ClientCommand::SendMessage(OutgoingMessage {
            body: draft.body.clone(),
            receivers: draft.receivers.clone(),
            timestamp: draft.schedule_at.map(truncate_to_minute),
        });
        self.slot = SendSlot::Pending(draft);
        Ok(command)
    }

    /// Resolves the pending draft with the server's verdict and frees the
    /// slot. A confirmed delivery becomes a stored message built from the
    /// receipt plus the draft, attributed to the session's username. Returns
    /// false when nothing was pending; such outcomes are dropped.
    pub fn on_outcome(
        &mut self,
        outcome: SendOutcome,
        session: &Session,
        messages: &mut MessageStore,
    ) -> bool {
        let SendSlot::Pending(draft) = std::mem::take(&mut self.slot) else {
            debug!(?outcome, "send outcome with nothing pending, dropping");
            return false;
        };
        match outcome {
            SendOutcome::Delivered(receipt) => {
                messages.apply_one(ChatMessage {
                    id: receipt.id,
                    sender: session.username().unwrap_or_default().to_owned(),
                    receivers: draft.receivers.unwrap_or_default(),
                    timestamp: receipt.timestamp,
                    body: draft.body,
                });
            }
            SendOutcome::Scheduled => {
                debug!("scheduled send parked on the server");
            }
            SendOutcome::Failed(reason) => {
                debug!(%reason, "send failed");
            }
        }
        true
    }

    /// Abandons the pending draft, if any. The connection teardown path
    /// calls this; a draft cannot outlive its connection.
    pub fn reset(&mut self) {
        self.slot = SendSlot::Idle;
    }
}

fn truncate_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}
