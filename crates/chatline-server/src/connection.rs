use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use chatline_proto::{Envelope, LoginStatus, OutgoingMessage, ServerEvent};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

/// One task per connection. Outbound frames flow through an unbounded
/// channel so state code never blocks on a slow socket; the writer half
/// drains it onto the wire.
async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut username: Option<String> = None;
    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                debug!(%error, "websocket receive failed");
                break;
            }
        };
        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(error) => {
                debug!(%error, "ignoring unparseable frame");
                continue;
            }
        };
        handle_frame(&state, &tx, &mut username, envelope).await;
    }

    if let Some(username) = username.as_deref() {
        state.log_out(username).await;
    }
    send_task.abort();
}

async fn handle_frame(
    state: &Arc<AppState>,
    tx: &mpsc::UnboundedSender<String>,
    username: &mut Option<String>,
    envelope: Envelope,
) {
    match envelope.kind.as_str() {
        "log_in" => {
            let Value::String(raw) = envelope.data else {
                reply(tx, &ServerEvent::LoginStatus(LoginStatus::BadUsername));
                return;
            };
            if username.is_some() {
                // One name per connection; switching means reconnecting.
                reply(tx, &ServerEvent::LoginStatus(LoginStatus::AlreadyLoggedIn));
                return;
            }
            match state.log_in(&raw, tx.clone()).await {
                Ok(name) => {
                    reply(tx, &ServerEvent::LoginStatus(LoginStatus::Ok));
                    reply(
                        tx,
                        &ServerEvent::MessageHistory(state.visible_history(&name).await),
                    );
                    reply(tx, &ServerEvent::Users(state.roster().await));
                    *username = Some(name);
                }
                Err(status) => reply(tx, &ServerEvent::LoginStatus(status)),
            }
        }
        "send_message" => {
            let Some(sender) = username.as_deref() else {
                reply(tx, &ServerEvent::SendFail("not logged in".into()));
                return;
            };
            let outgoing: OutgoingMessage = match serde_json::from_value(envelope.data) {
                Ok(outgoing) => outgoing,
                Err(error) => {
                    debug!(%error, "rejecting malformed send");
                    reply(tx, &ServerEvent::SendFail("invalid message payload".into()));
                    return;
                }
            };
            match outgoing.timestamp {
                Some(due) => {
                    state
                        .park(
                            sender,
                            outgoing.body,
                            outgoing.receivers.unwrap_or_default(),
                            due,
                        )
                        .await;
                    reply(tx, &ServerEvent::ScheduleSuccess);
                }
                None => {
                    let receipt = state.deliver(sender, outgoing).await;
                    reply(tx, &ServerEvent::SendSuccess(receipt));
                }
            }
        }
        other => {
            // Answered rather than dropped, so a confused client can tell.
            let ack = Envelope {
                kind: "status".into(),
                data: json!(format!("unknown message kind {other}")),
            };
            if let Ok(text) = serde_json::to_string(&ack) {
                let _ = tx.send(text);
            }
        }
    }
}

fn reply(tx: &mpsc::UnboundedSender<String>, event: &ServerEvent) {
    match event.to_json() {
        Ok(text) => {
            let _ = tx.send(text);
        }
        Err(error) => warn!(%error, "failed to encode reply"),
    }
}
