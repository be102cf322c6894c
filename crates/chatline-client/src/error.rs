use thiserror::Error;

use crate::session::SessionState;

/// Local refusal of a login request. Nothing was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("login requires an open, anonymous connection (currently {state:?})")]
    NotAnonymous { state: SessionState },
}

/// Local refusal of a send request. Nothing was sent and nothing is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("not logged in")]
    NotAuthenticated,
    #[error("previous send is still awaiting its outcome")]
    AlreadyPending,
}
