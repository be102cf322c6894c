use chatline_proto::{ClientCommand, LoginStatus};
use tracing::warn;

use crate::error::SessionError;

/// Connection lifecycle. `Closed` is terminal: reconnecting means a fresh
/// session, never a resurrected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    /// Transport is open but no username has been accepted yet.
    Anonymous,
    Authenticated,
    Closed,
}

/// Tracks where the connection is in its lifecycle and which username, if
/// any, the server has accepted for it.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    username: Option<String>,
    pending_login: Option<String>,
}

/// What a `login_status` reply did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Handshake accepted; the session now carries this username.
    Accepted(String),
    /// Server turned the name down; the session stays anonymous and the
    /// user may try another.
    Refused(LoginStatus),
    /// Reply had no outstanding request to match. Dropped.
    Stray,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn connect_started(&mut self) {
        if self.state == SessionState::Disconnected {
            self.state = SessionState::Connecting;
        }
    }

    pub fn transport_opened(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Anonymous;
        }
    }

    /// Starts the username handshake and returns the frame to transmit.
    /// Issuing another request before the reply arrives simply replaces the
    /// outstanding one; the server answers whichever name it saw last.
    pub fn request_login(&mut self, username: &str) -> Result<ClientCommand, SessionError> {
        if self.state != SessionState::Anonymous {
            return Err(SessionError::NotAnonymous { state: self.state });
        }
        let username = username.to_owned();
        self.pending_login = Some(username.clone());
        Ok(ClientCommand::LogIn(username))
    }

    /// Applies the server's verdict on the outstanding login request.
    pub fn login_result(&mut self, status: LoginStatus) -> LoginOutcome {
        let Some(pending) = self.pending_login.take() else {
            warn!(?status, "login reply without an outstanding request");
            return LoginOutcome::Stray;
        };
        match status {
            LoginStatus::Ok if self.state == SessionState::Anonymous => {
                self.state = SessionState::Authenticated;
                self.username = Some(pending.clone());
                LoginOutcome::Accepted(pending)
            }
            LoginStatus::Ok => {
                warn!(state = ?self.state, "login accepted in an unexpected state");
                LoginOutcome::Stray
            }
            refused => LoginOutcome::Refused(refused),
        }
    }

    /// The transport is gone, whatever state we were in.
    pub fn transport_closed(&mut self) {
        self.state = SessionState::Closed;
        self.pending_login = None;
    }
}
