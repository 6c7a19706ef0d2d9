//! Per-request gateway pipeline.
//!
//! ```text
//! RECEIVED -> RATE_CHECKED -> AUTH_CHECKED (protected routes only) -> ROUTED -> FORWARDED -> RESPONDED
//!     |             |                   |
//!     v             v                   v
//! REJECTED_RATE   NOT_FOUND         REJECTED_AUTH
//! ```
//!
//! The route lookup happens right after the rate check because it decides
//! whether authentication applies; it has no side effects, so a request
//! with no route never reaches the broker. Nothing is retried.

use crate::cache::{Verdict, fingerprint};
use crate::error::GatewayError;
use crate::metrics::RATE_LIMITED;
use crate::rate_limit::Admission;
use crate::state::AppState;
use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::Response;
use std::net::{IpAddr, SocketAddr};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Responded,
    RejectedRate,
    RejectedAuth,
    NotFound,
    BackendFailed,
}

impl Outcome {
    pub fn of(result: &Result<Response, GatewayError>) -> Self {
        match result {
            Ok(_) => Self::Responded,
            Err(GatewayError::RateExceeded { .. }) => Self::RejectedRate,
            Err(
                GatewayError::MissingCredential
                | GatewayError::InvalidCredential { .. }
                | GatewayError::BrokerUnavailable { .. },
            ) => Self::RejectedAuth,
            Err(GatewayError::NoRoute { .. }) => Self::NotFound,
            Err(GatewayError::BackendUnavailable { .. } | GatewayError::BackendTimeout { .. }) => {
                Self::BackendFailed
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Responded => "responded",
            Self::RejectedRate => "rejected_rate",
            Self::RejectedAuth => "rejected_auth",
            Self::NotFound => "not_found",
            Self::BackendFailed => "backend_failed",
        }
    }
}

// Who is asking, for rate limiting and X-Forwarded-For
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub key: String,
    pub ip: Option<IpAddr>,
}

impl ClientIdentity {
    pub fn of(request: &Request, trust_forwarded_for: bool) -> Self {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let forwarded = trust_forwarded_for
            .then(|| first_forwarded_for(request.headers()))
            .flatten();

        match forwarded.or(peer) {
            Some(ip) => Self {
                key: ip.to_string(),
                ip: peer,
            },
            None => Self {
                key: "unknown".to_string(),
                ip: None,
            },
        }
    }
}

fn first_forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// `Authorization: Bearer <token>`; any other shape is an invalid credential.
pub fn bearer_token(headers: &HeaderMap) -> Result<String, GatewayError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(GatewayError::MissingCredential)?;

    header
        .to_str()
        .ok()
        .and_then(|value| value.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(GatewayError::InvalidCredential {
            reason: "malformed authorization header",
        })
}

/// One admission against the shared limiter; every inbound request spends one.
pub fn check_rate(state: &AppState, client_key: &str) -> Result<(), GatewayError> {
    match state.limiter.admit(client_key) {
        Admission::Allowed => Ok(()),
        Admission::Rejected { retry_after } => {
            RATE_LIMITED.inc();
            Err(GatewayError::RateExceeded { retry_after })
        }
    }
}

pub async fn process(
    state: &AppState,
    client: ClientIdentity,
    request: Request,
) -> Result<Response, GatewayError> {
    // RECEIVED -> RATE_CHECKED
    check_rate(state, &client.key)?;

    let path = request.uri().path().to_string();
    let matched = state
        .routes
        .resolve(&path, request.uri().query())
        .ok_or_else(|| GatewayError::NoRoute { path: path.clone() })?;

    // RATE_CHECKED -> AUTH_CHECKED
    if matched.route.protected {
        let token = bearer_token(request.headers())?;
        match state.validator.validate(&token).await {
            Ok(Verdict::Valid(_)) => {}
            Ok(Verdict::Invalid) => {
                return Err(GatewayError::InvalidCredential {
                    reason: "token inactive",
                });
            }
            Err(e) => {
                return Err(GatewayError::BrokerUnavailable {
                    reason: e.to_string(),
                });
            }
        }
    }

    let signing_out = match &state.signout_path {
        Some(signout) if *signout == path => bearer_token(request.headers()).ok(),
        _ => None,
    };

    // ROUTED -> FORWARDED -> RESPONDED
    let response = state.forwarder.forward(&matched, request, client.ip).await?;

    if let Some(token) = signing_out {
        if response.status().is_success() && state.cache.invalidate(&token) {
            info!(token = %fingerprint(&token), "evicted signed-out token from cache");
        }
    }
    Ok(response)
}
