//! Client-side synchronization core for a chatline server: one WebSocket
//! session, reconciled timeline and roster stores, and a single-slot send
//! coordinator that folds server acknowledgements back into local state.
//!
//! The server owns the truth. Everything here converges on what it pushes:
//! ids and timestamps are only ever adopted from acknowledgements, never
//! invented locally.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod messages;
pub mod outbox;
pub mod presence;
pub mod session;

pub use client::ChatClient;
pub use dispatch::{dispatch, ClientEvent};
pub use error::{SendError, SessionError};
pub use messages::MessageStore;
pub use outbox::{Draft, Outbox, SendOutcome};
pub use presence::PresenceStore;
pub use session::{LoginOutcome, Session, SessionState};

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod dispatch_tests;

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod client_tests;
