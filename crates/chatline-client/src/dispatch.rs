use chatline_proto::{LoginStatus, ServerEvent};
use tracing::debug;

use crate::{
    messages::MessageStore,
    outbox::{Outbox, SendOutcome},
    presence::PresenceStore,
    session::{LoginOutcome, Session},
};

/// Signals for whoever is driving a user interface. Each one means "this
/// slice of state changed, repaint or notify"; the receiver pulls fresh
/// snapshots rather than carrying data out of the event itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    LoggedIn { username: String },
    LoginRejected(LoginStatus),
    TimelineUpdated,
    RosterUpdated,
    SendScheduled,
    SendFailed(String),
    Disconnected,
}

/// Routes one decoded server frame to the component that owns its slice of
/// state. Pure state manipulation: no I/O and no locking, so every arm is
/// exercised directly in tests.
pub fn dispatch(
    event: ServerEvent,
    session: &mut Session,
    messages: &mut MessageStore,
    presence: &mut PresenceStore,
    outbox: &mut Outbox,
) -> Vec<ClientEvent> {
    let mut emitted = Vec::new();
    match event {
        ServerEvent::LoginStatus(status) => match session.login_result(status) {
            LoginOutcome::Accepted(username) => emitted.push(ClientEvent::LoggedIn { username }),
            LoginOutcome::Refused(status) => emitted.push(ClientEvent::LoginRejected(status)),
            LoginOutcome::Stray => {}
        },
        ServerEvent::Users(batch) => {
            presence.set_many(batch);
            emitted.push(ClientEvent::RosterUpdated);
        }
        ServerEvent::UserLoggedIn(username) => {
            presence.set_one(username, true);
            emitted.push(ClientEvent::RosterUpdated);
        }
        ServerEvent::UserLoggedOut(username) => {
            presence.set_one(username, false);
            emitted.push(ClientEvent::RosterUpdated);
        }
        ServerEvent::MessageHistory(batch) => {
            messages.apply_history(batch);
            emitted.push(ClientEvent::TimelineUpdated);
        }
        ServerEvent::NewMessage(message) => {
            messages.apply_one(message);
            emitted.push(ClientEvent::TimelineUpdated);
        }
        ServerEvent::SendSuccess(receipt) => {
            if outbox.on_outcome(SendOutcome::Delivered(receipt), session, messages) {
                emitted.push(ClientEvent::TimelineUpdated);
            }
        }
        ServerEvent::ScheduleSuccess => {
            if outbox.on_outcome(SendOutcome::Scheduled, session, messages) {
                emitted.push(ClientEvent::SendScheduled);
            }
        }
        ServerEvent::SendFail(reason) => {
            if outbox.on_outcome(SendOutcome::Failed(reason.clone()), session, messages) {
                emitted.push(ClientEvent::SendFailed(reason));
            }
        }
        ServerEvent::Unknown { kind } => {
            debug!(%kind, "ignoring unknown server frame kind");
        }
    }
    emitted
}
