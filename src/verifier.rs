//! Gateway-side client for the identity broker's `verifyToken` contract.

use crate::models::{Introspection, TokenMetadata};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerVerdict {
    Active(TokenMetadata),
    Inactive,
}

/// The broker could not produce a verdict.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("broker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("broker unreachable: {0}")]
    Transport(String),

    #[error("broker answered with status {0}")]
    UpstreamStatus(u16),

    #[error("broker sent a malformed body: {0}")]
    Malformed(String),
}

/// Anything that can answer "is this bearer token active?".
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<BrokerVerdict, VerifyError>;
}

// Calls `GET {broker}/verifyToken` with the token as bearer credential
pub struct HttpTokenVerifier {
    client: reqwest::Client,
    verify_url: String,
    timeout: Duration,
}

impl HttpTokenVerifier {
    pub fn new(broker_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            verify_url: format!("{}/verifyToken", broker_url.trim_end_matches('/')),
            timeout,
        })
    }

    fn classify(&self, err: reqwest::Error) -> VerifyError {
        if err.is_timeout() {
            VerifyError::Timeout(self.timeout)
        } else if err.is_decode() {
            VerifyError::Malformed(err.to_string())
        } else {
            VerifyError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify_token(&self, token: &str) -> Result<BrokerVerdict, VerifyError> {
        let res = self
            .client
            .get(&self.verify_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = res.status();

        // 408/429 say nothing about the token
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(VerifyError::UpstreamStatus(status.as_u16()));
        }
        if status.is_client_error() {
            return Ok(BrokerVerdict::Inactive);
        }
        if !status.is_success() {
            return Err(VerifyError::UpstreamStatus(status.as_u16()));
        }

        let report: Introspection = res.json().await.map_err(|e| self.classify(e))?;
        if report.active {
            Ok(BrokerVerdict::Active(report.metadata()))
        } else {
            Ok(BrokerVerdict::Inactive)
        }
    }
}
