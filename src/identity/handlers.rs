use super::{IdentityProvider, IdpError};
use crate::models::{
    LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, SignoutRequest, SuspendRequest,
};
use crate::pipeline::bearer_token;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct BrokerState {
    pub provider: Arc<dyn IdentityProvider>,
}

pub fn router(state: Arc<BrokerState>) -> Router {
    Router::new()
        .route("/login", post(login_handler))
        .route("/refreshToken", post(refresh_handler))
        .route("/verifyToken", get(verify_handler))
        .route("/signout", post(signout_handler))
        .route("/suspend", patch(suspend_handler))
        .route("/health", get(crate::handlers::health_handler))
        .with_state(state)
}

// Plain-text failure answer
struct Failure(StatusCode, String);

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// IdP said no -> `rejected`; IdP broken or unreachable -> 502
fn failure(err: IdpError, rejected: StatusCode, message: &str) -> Failure {
    if err.is_rejection() {
        warn!(error = %err, "identity provider rejected request");
        Failure(rejected, message.to_string())
    } else {
        error!(error = %err, "identity provider call failed");
        Failure(
            StatusCode::BAD_GATEWAY,
            "Identity provider unavailable".to_string(),
        )
    }
}

fn require_admin_token(headers: &HeaderMap) -> Result<String, Failure> {
    bearer_token(headers).map_err(|_| {
        Failure(
            StatusCode::UNAUTHORIZED,
            "Missing authorization header".to_string(),
        )
    })
}

async fn login_handler(
    State(state): State<Arc<BrokerState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Failure> {
    let grant = state
        .provider
        .login(&payload.username, &payload.password)
        .await
        .map_err(|e| failure(e, StatusCode::UNAUTHORIZED, "Invalid credentials"))?;

    info!(username = %payload.username, "login succeeded");
    Ok(Json(LoginResponse {
        access_token: grant.access_token.clone(),
        refresh_token: grant.refresh_token.clone(),
        grant,
    }))
}

async fn refresh_handler(
    State(state): State<Arc<BrokerState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, Failure> {
    let grant = state
        .provider
        .refresh(&payload.refresh_token)
        .await
        .map_err(|e| failure(e, StatusCode::BAD_REQUEST, "Invalid refresh token"))?;

    // the IdP may rotate the refresh token; fall back to the presented one
    Ok(Json(RefreshResponse {
        access_token: grant.access_token,
        refresh_token: grant.refresh_token.unwrap_or(payload.refresh_token),
    }))
}

async fn verify_handler(
    State(state): State<Arc<BrokerState>>,
    headers: HeaderMap,
) -> Result<Response, Failure> {
    let token = bearer_token(&headers)
        .map_err(|e| Failure(StatusCode::UNAUTHORIZED, e.public_message()))?;

    let report = state
        .provider
        .introspect(&token)
        .await
        .map_err(|e| failure(e, StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

    if !report.active {
        return Err(Failure(
            StatusCode::UNAUTHORIZED,
            "Invalid or expired token".to_string(),
        ));
    }
    Ok(Json(report).into_response())
}

async fn signout_handler(
    State(state): State<Arc<BrokerState>>,
    Json(payload): Json<SignoutRequest>,
) -> Result<Json<serde_json::Value>, Failure> {
    state
        .provider
        .revoke(&payload.refresh_token)
        .await
        .map_err(|e| failure(e, StatusCode::INTERNAL_SERVER_ERROR, "Error logging out"))?;

    Ok(Json(serde_json::json!({ "signedOut": true })))
}

async fn suspend_handler(
    State(state): State<Arc<BrokerState>>,
    headers: HeaderMap,
    Json(payload): Json<SuspendRequest>,
) -> Result<String, Failure> {
    let admin_token = require_admin_token(&headers)?;
    let user_id = payload.user_id;

    match state.provider.disable_user(&user_id, &admin_token).await {
        Ok(()) => {
            info!(%user_id, "user suspended");
            Ok(format!("User with ID '{user_id}' updated successfully."))
        }
        // relay the IdP's own verdict (403 for a non-admin token, 404 unknown user)
        Err(IdpError::Rejected { status, .. }) => {
            warn!(%user_id, status, "suspend rejected by identity provider");
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
            Err(Failure(
                status,
                format!("Failed to update user with ID '{user_id}'"),
            ))
        }
        Err(e) => Err(failure(
            e,
            StatusCode::BAD_REQUEST,
            "Failed to update user",
        )),
    }
}
