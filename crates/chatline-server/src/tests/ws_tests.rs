use std::{net::SocketAddr, time::Duration};

use axum::{body, body::Body, http::Request, http::StatusCode};
use chatline_proto::{
    ClientCommand, Envelope, LoginStatus, MessageId, OutgoingMessage, ServerEvent,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use super::*;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::new());
    let app = build_router(Arc::clone(&state));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");
    ws
}

async fn send(ws: &mut WsClient, command: &ClientCommand) {
    let text = serde_json::to_string(command).expect("serialize");
    ws.send(Message::Text(text)).await.expect("send");
}

async fn recv_text(ws: &mut WsClient) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("receive");
        if let Message::Text(text) = frame {
            return text;
        }
    }
}

async fn recv(ws: &mut WsClient) -> ServerEvent {
    ServerEvent::from_json(&recv_text(ws).await).expect("decode")
}

/// Drives the full handshake and swallows the ok/history/users replies.
async fn login(ws: &mut WsClient, username: &str) {
    send(ws, &ClientCommand::LogIn(username.into())).await;
    assert_eq!(recv(ws).await, ServerEvent::LoginStatus(LoginStatus::Ok));
    assert!(matches!(recv(ws).await, ServerEvent::MessageHistory(_)));
    assert!(matches!(recv(ws).await, ServerEvent::Users(_)));
}

fn immediate(body: &str) -> ClientCommand {
    ClientCommand::SendMessage(OutgoingMessage {
        body: body.into(),
        receivers: None,
        timestamp: None,
    })
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = build_router(Arc::new(AppState::new()));
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn login_replies_ok_then_history_then_roster() {
    let (addr, _state) = start_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, &ClientCommand::LogIn("ada".into())).await;
    assert_eq!(recv(&mut ws).await, ServerEvent::LoginStatus(LoginStatus::Ok));
    assert_eq!(recv(&mut ws).await, ServerEvent::MessageHistory(Vec::new()));

    let ServerEvent::Users(roster) = recv(&mut ws).await else {
        panic!("expected the roster");
    };
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].username, "ada");
    assert!(roster[0].online);
}

#[tokio::test]
async fn bad_and_duplicate_usernames_are_refused() {
    let (addr, _state) = start_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, &ClientCommand::LogIn("   ".into())).await;
    assert_eq!(
        recv(&mut ws).await,
        ServerEvent::LoginStatus(LoginStatus::BadUsername)
    );

    // The refused connection may retry with a valid name.
    login(&mut ws, "ada").await;

    let mut second = connect(addr).await;
    send(&mut second, &ClientCommand::LogIn("ada".into())).await;
    assert_eq!(
        recv(&mut second).await,
        ServerEvent::LoginStatus(LoginStatus::AlreadyLoggedIn)
    );
}

#[tokio::test]
async fn sending_before_login_fails() {
    let (addr, _state) = start_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, &immediate("hello?")).await;
    assert_eq!(
        recv(&mut ws).await,
        ServerEvent::SendFail("not logged in".into())
    );
}

#[tokio::test]
async fn immediate_send_returns_a_receipt_and_pushes_to_others() {
    let (addr, _state) = start_server().await;
    let mut ada = connect(addr).await;
    let mut bob = connect(addr).await;
    login(&mut ada, "ada").await;
    login(&mut bob, "bob").await;
    assert_eq!(
        recv(&mut ada).await,
        ServerEvent::UserLoggedIn("bob".into())
    );

    send(&mut ada, &immediate("hello")).await;

    let receipt = match recv(&mut ada).await {
        ServerEvent::SendSuccess(receipt) => receipt,
        other => panic!("expected a receipt, got {other:?}"),
    };
    assert_eq!(receipt.id, MessageId(1));

    let pushed = recv(&mut bob).await;
    assert!(
        matches!(&pushed, ServerEvent::NewMessage(m) if m.body == "hello" && m.id == receipt.id && m.sender == "ada")
    );
}

#[tokio::test]
async fn restricted_sends_reach_only_their_addressees() {
    let (addr, _state) = start_server().await;
    let mut ada = connect(addr).await;
    let mut bob = connect(addr).await;
    let mut eve = connect(addr).await;
    login(&mut ada, "ada").await;
    login(&mut bob, "bob").await;
    login(&mut eve, "eve").await;
    assert_eq!(recv(&mut ada).await, ServerEvent::UserLoggedIn("bob".into()));
    assert_eq!(recv(&mut ada).await, ServerEvent::UserLoggedIn("eve".into()));
    assert_eq!(recv(&mut bob).await, ServerEvent::UserLoggedIn("eve".into()));

    send(
        &mut ada,
        &ClientCommand::SendMessage(OutgoingMessage {
            body: "psst".into(),
            receivers: Some(vec!["bob".into()]),
            timestamp: None,
        }),
    )
    .await;
    assert!(matches!(recv(&mut ada).await, ServerEvent::SendSuccess(_)));
    assert!(matches!(recv(&mut bob).await, ServerEvent::NewMessage(m) if m.body == "psst"));

    // Eve must not see it; a broadcast afterwards proves her stream is live.
    send(&mut ada, &immediate("hi everyone")).await;
    assert!(matches!(recv(&mut ada).await, ServerEvent::SendSuccess(_)));
    assert!(matches!(recv(&mut eve).await, ServerEvent::NewMessage(m) if m.body == "hi everyone"));
}

#[tokio::test]
async fn a_late_joiner_receives_only_history_they_may_see() {
    let (addr, _state) = start_server().await;
    let mut ada = connect(addr).await;
    login(&mut ada, "ada").await;

    send(&mut ada, &immediate("public")).await;
    assert!(matches!(recv(&mut ada).await, ServerEvent::SendSuccess(_)));
    send(
        &mut ada,
        &ClientCommand::SendMessage(OutgoingMessage {
            body: "for grace only".into(),
            receivers: Some(vec!["grace".into()]),
            timestamp: None,
        }),
    )
    .await;
    assert!(matches!(recv(&mut ada).await, ServerEvent::SendSuccess(_)));

    let mut bob = connect(addr).await;
    send(&mut bob, &ClientCommand::LogIn("bob".into())).await;
    assert_eq!(recv(&mut bob).await, ServerEvent::LoginStatus(LoginStatus::Ok));

    let ServerEvent::MessageHistory(history) = recv(&mut bob).await else {
        panic!("expected history");
    };
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body, "public");

    let ServerEvent::Users(roster) = recv(&mut bob).await else {
        panic!("expected the roster");
    };
    let names: Vec<&str> = roster.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["ada", "bob"]);
}

#[tokio::test]
async fn disconnect_broadcasts_user_logged_out() {
    let (addr, _state) = start_server().await;
    let mut ada = connect(addr).await;
    let mut bob = connect(addr).await;
    login(&mut ada, "ada").await;
    login(&mut bob, "bob").await;
    assert_eq!(recv(&mut ada).await, ServerEvent::UserLoggedIn("bob".into()));

    bob.close(None).await.expect("close");
    assert_eq!(
        recv(&mut ada).await,
        ServerEvent::UserLoggedOut("bob".into())
    );
}

#[tokio::test]
async fn scheduled_sends_fire_and_reach_everyone_including_the_sender() {
    let (addr, state) = start_server().await;
    let mut ada = connect(addr).await;
    let mut bob = connect(addr).await;
    login(&mut ada, "ada").await;
    login(&mut bob, "bob").await;
    assert_eq!(recv(&mut ada).await, ServerEvent::UserLoggedIn("bob".into()));

    send(
        &mut ada,
        &ClientCommand::SendMessage(OutgoingMessage {
            body: "time capsule".into(),
            receivers: None,
            timestamp: Some(Utc::now() - chrono::Duration::minutes(1)),
        }),
    )
    .await;
    assert_eq!(recv(&mut ada).await, ServerEvent::ScheduleSuccess);
    assert_eq!(state.scheduled_count().await, 1);

    scheduler::spawn(Arc::clone(&state), Duration::from_millis(20));

    let fired = recv(&mut ada).await;
    assert!(
        matches!(&fired, ServerEvent::NewMessage(m) if m.body == "time capsule" && m.sender == "ada")
    );
    let bob_copy = recv(&mut bob).await;
    assert!(matches!(&bob_copy, ServerEvent::NewMessage(m) if m.body == "time capsule"));
    assert_eq!(state.scheduled_count().await, 0);
}

#[tokio::test]
async fn malformed_send_payloads_fail_cleanly() {
    let (addr, _state) = start_server().await;
    let mut ws = connect(addr).await;
    login(&mut ws, "ada").await;

    ws.send(Message::Text(r#"{"kind":"send_message","data":"nope"}"#.into()))
        .await
        .expect("send");
    assert_eq!(
        recv(&mut ws).await,
        ServerEvent::SendFail("invalid message payload".into())
    );
}

#[tokio::test]
async fn unknown_kinds_get_a_status_answer() {
    let (addr, _state) = start_server().await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text(r#"{"kind":"poke","data":null}"#.into()))
        .await
        .expect("send");
    let ack: Envelope = serde_json::from_str(&recv_text(&mut ws).await).expect("parse");
    assert_eq!(ack.kind, "status");
    assert_eq!(
        ack.data.as_str(),
        Some("unknown message kind poke")
    );
}
