use crate::error::GatewayError;
use crate::metrics::{REQUEST_LATENCY, REQUEST_OUTCOMES, REQUEST_TOTAL};
use crate::pipeline::{self, ClientIdentity, Outcome};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// Fallback handler: every path that is not /health or /metrics
pub async fn gateway_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();

    let client = ClientIdentity::of(&request, state.trust_forwarded_for);
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_key = client.key.clone();

    let result = pipeline::process(&state, client, request).await;

    let outcome = Outcome::of(&result);
    REQUEST_OUTCOMES.with_label_values(&[outcome.as_str()]).inc();
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());

    match result {
        Ok(response) => {
            debug!(%method, %path, status = response.status().as_u16(), "relayed backend response");
            response
        }
        Err(err) => {
            log_rejection(&err, &method, &path, &client_key);
            err.into_response()
        }
    }
}

fn log_rejection(err: &GatewayError, method: &axum::http::Method, path: &str, client: &str) {
    match err {
        GatewayError::BrokerUnavailable { .. }
        | GatewayError::BackendUnavailable { .. }
        | GatewayError::BackendTimeout { .. } => {
            warn!(%method, path, client, error = %err, "request failed")
        }
        GatewayError::RateExceeded { .. } => {
            info!(%method, path, client, "rate limit exceeded")
        }
        _ => debug!(%method, path, client, error = %err, "request rejected"),
    }
}
