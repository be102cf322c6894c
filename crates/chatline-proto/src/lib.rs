pub mod domain;
pub mod error;
pub mod protocol;

pub use domain::{ChatMessage, LoginStatus, MessageId, PresenceUpdate, SendReceipt};
pub use error::ProtocolError;
pub use protocol::{ClientCommand, Envelope, OutgoingMessage, ServerEvent};
