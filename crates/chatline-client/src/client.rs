use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chatline_proto::{ChatMessage, ClientCommand, PresenceUpdate, ServerEvent};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::warn;

use crate::{
    dispatch::{dispatch, ClientEvent},
    messages::MessageStore,
    outbox::{Draft, Outbox},
    presence::PresenceStore,
    session::{Session, SessionState},
};

#[derive(Debug, Default)]
struct ClientInner {
    session: Session,
    messages: MessageStore,
    presence: PresenceStore,
    outbox: Outbox,
}

enum Outbound {
    Frame(ClientCommand),
    Hangup,
}

/// A live connection to a chat server. All state sits behind one lock, so
/// server frames and user actions interleave cleanly; consumers watch the
/// broadcast channel and pull snapshots when told something changed.
#[derive(Debug)]
pub struct ChatClient {
    inner: Mutex<ClientInner>,
    outbound: mpsc::UnboundedSender<Outbound>,
    events: broadcast::Sender<ClientEvent>,
}

impl ChatClient {
    /// Opens the WebSocket and spawns the reader and writer tasks. The
    /// session comes up anonymous; call `login` to claim a username.
    pub async fn connect(server_url: &str) -> Result<Arc<Self>> {
        if !server_url.starts_with("ws://") && !server_url.starts_with("wss://") {
            return Err(anyhow!("server_url must start with ws:// or wss://"));
        }
        let mut state = ClientInner::default();
        state.session.connect_started();
        let (ws_stream, _) = connect_async(server_url)
            .await
            .with_context(|| format!("failed to connect websocket: {server_url}"))?;
        state.session.transport_opened();

        let (events, _) = broadcast::channel(1024);
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let client = Arc::new(Self {
            inner: Mutex::new(state),
            outbound,
            events,
        });

        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        tokio::spawn(async move {
            while let Some(item) = outbound_rx.recv().await {
                match item {
                    Outbound::Frame(command) => {
                        let text = match serde_json::to_string(&command) {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        if ws_writer.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Hangup => {
                        let _ = ws_writer.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        let reader = Arc::clone(&client);
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerEvent::from_json(&text) {
                        Ok(event) => reader.apply(event).await,
                        Err(error) => {
                            warn!(%error, "dropping undecodable server frame");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "websocket receive failed");
                        break;
                    }
                }
            }
            reader.connection_lost().await;
        });

        Ok(client)
    }

    /// Claims `username`. The server's verdict arrives later as a
    /// `LoggedIn` or `LoginRejected` event.
    pub async fn login(&self, username: &str) -> Result<()> {
        let command = self.inner.lock().await.session.request_login(username)?;
        self.queue(command)
    }

    /// Hands a draft to the send slot. Refused while anonymous or while an
    /// earlier send is unresolved; on success the message joins the
    /// timeline only once the server confirms it.
    pub async fn send(&self, draft: Draft) -> Result<()> {
        let command = {
            let mut guard = self.inner.lock().await;
            let ClientInner {
                session, outbox, ..
            } = &mut *guard;
            outbox.begin_send(draft, session)?
        };
        self.queue(command)
    }

    pub async fn session_state(&self) -> SessionState {
        self.inner.lock().await.session.state()
    }

    pub async fn username(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .session
            .username()
            .map(str::to_owned)
    }

    /// Timeline snapshot, oldest first.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.messages.snapshot().to_vec()
    }

    /// Roster snapshot with the local user filtered out.
    pub async fn roster(&self) -> Vec<PresenceUpdate> {
        let mut guard = self.inner.lock().await;
        let ClientInner {
            session, presence, ..
        } = &mut *guard;
        let local = session.username();
        presence
            .snapshot()
            .iter()
            .filter(|entry| Some(entry.username.as_str()) != local)
            .cloned()
            .collect()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Starts a clean shutdown. The writer sends a close frame and stops;
    /// the reader finishes the teardown once the peer closes its side, and
    /// a `Disconnected` event follows.
    pub fn disconnect(&self) {
        let _ = self.outbound.send(Outbound::Hangup);
    }

    fn queue(&self, command: ClientCommand) -> Result<()> {
        self.outbound
            .send(Outbound::Frame(command))
            .map_err(|_| anyhow!("connection closed"))
    }

    async fn apply(&self, event: ServerEvent) {
        let emitted = {
            let mut guard = self.inner.lock().await;
            let ClientInner {
                session,
                messages,
                presence,
                outbox,
            } = &mut *guard;
            dispatch(event, session, messages, presence, outbox)
        };
        for event in emitted {
            let _ = self.events.send(event);
        }
    }

    async fn connection_lost(&self) {
        {
            let mut guard = self.inner.lock().await;
            guard.session.transport_closed();
            // Whatever was awaiting a verdict died with the connection.
            guard.outbox.reset();
        }
        let _ = self.events.send(ClientEvent::Disconnected);
    }
}
