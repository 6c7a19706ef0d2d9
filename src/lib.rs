//! Edge layer for a microservice deployment: a rate limiting, authenticating
//! reverse proxy (the gateway) and the identity broker it asks about tokens.

pub mod cache;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod handlers;
pub mod identity;
pub mod maintenance;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod routes;
pub mod shutdown;
pub mod state;
pub mod telemetry;
pub mod validator;
pub mod verifier;
