use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::state::AppState;

pub const TICK: Duration = Duration::from_secs(1);

/// Wakes on every tick and promotes parked sends whose instant has passed.
pub fn spawn(state: Arc<AppState>, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            let fired = state.fire_due(Utc::now()).await;
            if fired > 0 {
                debug!(fired, "scheduled messages delivered");
            }
        }
    })
}
