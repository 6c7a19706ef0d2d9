mod gateway;
mod health;
mod metrics;

pub use gateway::gateway_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;

use crate::pipeline::{ClientIdentity, check_rate};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use std::sync::Arc;

// creating the router; anything not matched here goes through the pipeline.
// /health and /metrics are answered locally, so no backend can be mounted on
// them, but they spend the caller's rate budget like any other request.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limited,
        ))
        .fallback(gateway_handler)
        .with_state(state)
}

async fn rate_limited(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let client = ClientIdentity::of(&request, state.trust_forwarded_for);
    match check_rate(&state, &client.key) {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}
