//! WebSocket chat server: username handshake, presence broadcasts,
//! addressed and broadcast messages, and minute-granularity scheduled
//! delivery. Wire protocol shapes live in `chatline-proto`.

pub mod config;
pub mod connection;
pub mod scheduler;
pub mod state;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(connection::ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
#[path = "tests/ws_tests.rs"]
mod ws_tests;
