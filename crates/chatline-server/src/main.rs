use std::{net::SocketAddr, sync::Arc};

use chatline_server::{build_router, config::load_settings, scheduler, state::AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let state = Arc::new(AppState::new());
    scheduler::spawn(Arc::clone(&state), scheduler::TICK);
    let app = build_router(state);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
