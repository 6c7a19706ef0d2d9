use crate::state::AppState;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{debug, info};

// Background sweep - drops elapsed rate windows and expired cache entries
pub async fn sweeper(state: Arc<AppState>, every: Duration) {
    let mut interval = interval(every);

    info!(interval = ?every, "maintenance sweeper started");

    loop {
        interval.tick().await;
        sweep(&state);
    }
}

pub fn sweep(state: &AppState) {
    let windows = state.limiter.prune();
    let verdicts = state.cache.purge_expired();

    if windows > 0 || verdicts > 0 {
        debug!(
            windows,
            verdicts,
            tracked_clients = state.limiter.tracked_clients(),
            cached = state.cache.len(),
            "pruned expired state"
        );
    }
}
