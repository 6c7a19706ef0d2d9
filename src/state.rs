use crate::cache::CredentialCache;
use crate::config::{ConfigError, GatewayArgs};
use crate::forwarder::Forwarder;
use crate::rate_limit::RateLimiter;
use crate::routes::RouteTable;
use crate::validator::TokenValidator;
use crate::verifier::{HttpTokenVerifier, TokenVerifier};
use std::sync::Arc;

// app's shared state
pub struct AppState {
    pub limiter: RateLimiter,
    pub cache: Arc<CredentialCache>,
    pub validator: TokenValidator,
    pub routes: RouteTable,
    pub forwarder: Forwarder,
    pub signout_path: Option<String>,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn from_args(args: &GatewayArgs) -> Result<Self, ConfigError> {
        let verifier = HttpTokenVerifier::new(&args.broker_url, args.broker_timeout())?;
        Self::with_verifier(args, Arc::new(verifier))
    }

    // Same wiring with any broker implementation behind the validator
    pub fn with_verifier(
        args: &GatewayArgs,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Result<Self, ConfigError> {
        args.validate()?;

        let cache = Arc::new(CredentialCache::new());
        Ok(Self {
            limiter: RateLimiter::new(args.rate_limit, args.rate_window()),
            validator: TokenValidator::new(Arc::clone(&cache), verifier, args.cache_ttl()),
            cache,
            routes: args.route_table()?,
            forwarder: Forwarder::new(args.backend_timeout())?,
            signout_path: args.signout_path(),
            trust_forwarded_for: args.trust_forwarded_for,
        })
    }
}
