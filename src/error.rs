//! Terminal failures of the gateway pipeline and their HTTP mapping.

use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

/// Every way a request can end without reaching a backend response.
///
/// None of these are retried by the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rate limit exceeded")]
    RateExceeded { retry_after: Duration },

    #[error("missing authorization header")]
    MissingCredential,

    #[error("invalid credential: {reason}")]
    InvalidCredential { reason: &'static str },

    /// The broker could not give an answer; treated as an auth failure.
    #[error("identity broker unavailable: {reason}")]
    BrokerUnavailable { reason: String },

    #[error("no route for {path}")]
    NoRoute { path: String },

    #[error("backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("backend {backend} timed out after {after:?}")]
    BackendTimeout { backend: String, after: Duration },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingCredential
            | Self::InvalidCredential { .. }
            | Self::BrokerUnavailable { .. } => StatusCode::UNAUTHORIZED,
            Self::NoRoute { .. } => StatusCode::NOT_FOUND,
            Self::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    // Text sent to the caller; invalid and broker-unavailable share one message
    pub fn public_message(&self) -> String {
        match self {
            Self::RateExceeded { .. } => "Too many requests, please try again later.".to_string(),
            Self::MissingCredential => "Missing authorization header".to_string(),
            Self::InvalidCredential { .. } | Self::BrokerUnavailable { .. } => {
                "Invalid or expired token".to_string()
            }
            Self::NoRoute { path } => format!("No route for {path}"),
            Self::BackendUnavailable { backend, .. } => format!("Backend {backend} unavailable"),
            Self::BackendTimeout { backend, .. } => format!("Backend {backend} timed out"),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.public_message()).into_response();

        if let Self::RateExceeded { retry_after } = self {
            // whole seconds, never advertise 0
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}
