use crate::cache::{CredentialCache, Verdict, fingerprint};
use crate::metrics::{BROKER_CALLS, CACHE_HITS, CACHE_MISSES};
use crate::models::TokenMetadata;
use crate::verifier::{BrokerVerdict, TokenVerifier, VerifyError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cache-first token validation.
///
/// A cached `Valid` verdict is trusted until its ttl runs out, so a token
/// revoked at the IdP stays usable through the gateway for at most `ttl`.
/// Only positive verdicts are cached; an inactive token goes back to the
/// broker on every request.
pub struct TokenValidator {
    cache: Arc<CredentialCache>,
    verifier: Arc<dyn TokenVerifier>,
    ttl: Duration,
}

impl TokenValidator {
    pub fn new(cache: Arc<CredentialCache>, verifier: Arc<dyn TokenVerifier>, ttl: Duration) -> Self {
        Self {
            cache,
            verifier,
            ttl,
        }
    }

    /// `Err` means the broker could not answer, never that the token is bad.
    pub async fn validate(&self, token: &str) -> Result<Verdict, VerifyError> {
        if let Some(verdict) = self.cache.get(token) {
            CACHE_HITS.inc();
            debug!(token = %fingerprint(token), "credential cache hit");
            return Ok(verdict);
        }
        CACHE_MISSES.inc();

        match self.verifier.verify_token(token).await {
            Ok(BrokerVerdict::Active(metadata)) => {
                BROKER_CALLS.with_label_values(&["active"]).inc();
                let ttl = self.ttl_for(&metadata);
                if !ttl.is_zero() {
                    self.cache.put(token, Verdict::Valid(metadata.clone()), ttl);
                }
                debug!(token = %fingerprint(token), ?ttl, "token verified by broker");
                Ok(Verdict::Valid(metadata))
            }
            Ok(BrokerVerdict::Inactive) => {
                BROKER_CALLS.with_label_values(&["inactive"]).inc();
                info!(token = %fingerprint(token), "broker reports token inactive");
                Ok(Verdict::Invalid)
            }
            Err(e) => {
                BROKER_CALLS.with_label_values(&["unavailable"]).inc();
                warn!(token = %fingerprint(token), error = %e, "token verification failed");
                Err(e)
            }
        }
    }

    // Never cache past the token's own expiry
    fn ttl_for(&self, metadata: &TokenMetadata) -> Duration {
        let Some(exp) = metadata.exp else {
            return self.ttl;
        };
        let remaining = exp - chrono::Utc::now().timestamp();
        if remaining <= 0 {
            Duration::ZERO
        } else {
            self.ttl.min(Duration::from_secs(remaining as u64))
        }
    }
}
