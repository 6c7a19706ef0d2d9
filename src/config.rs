use crate::routes::{Route, RouteTable};
use crate::telemetry::LogFormat;
use clap::Parser;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid route '{spec}': {reason}")]
    InvalidRoute { spec: String, reason: String },

    #[error("duplicate route prefix {0}")]
    DuplicatePrefix(String),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: &'static str },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

// `PREFIX=URL` as given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub prefix: String,
    pub target: String,
}

impl FromStr for RouteSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidRoute {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let (prefix, target) = s.split_once('=').ok_or_else(|| invalid("expected PREFIX=URL"))?;
        let (prefix, target) = (prefix.trim(), target.trim());
        if prefix.is_empty() {
            return Err(invalid("empty prefix"));
        }
        if target.is_empty() {
            return Err(invalid("empty backend URL"));
        }

        // add http:// if not present
        let target = if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!("http://{}", target)
        };

        Ok(Self {
            prefix: prefix.to_string(),
            target,
        })
    }
}

// Gateway CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "edge-gateway")]
#[command(about = "Rate limiting, authenticating reverse proxy in front of backend services")]
pub struct GatewayArgs {
    // Port to run the gateway on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    // Identity broker base URL (serves /verifyToken)
    #[arg(long, env = "BROKER_URL", default_value = "http://localhost:3001")]
    pub broker_url: String,

    // Protected routes, PREFIX=URL; repeat or comma-separate
    #[arg(
        long = "route",
        env = "GATEWAY_ROUTES",
        value_delimiter = ',',
        default_values = ["/api/service1=http://localhost:3002"]
    )]
    pub routes: Vec<RouteSpec>,

    // Routes reachable without a token (the broker passthrough)
    #[arg(
        long = "public-route",
        env = "GATEWAY_PUBLIC_ROUTES",
        value_delimiter = ',',
        default_values = ["/api/auth=http://localhost:3001"]
    )]
    pub public_routes: Vec<RouteSpec>,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 100)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_WINDOW", default_value_t = 60)]
    pub rate_window: u64,

    // Credential cache TTL in seconds (0 disables caching)
    #[arg(short, long, env = "CACHE_TTL", default_value_t = 30)]
    pub cache_ttl: u64,

    // Timeout for verifyToken calls, seconds
    #[arg(long, env = "BROKER_TIMEOUT", default_value_t = 5)]
    pub broker_timeout: u64,

    // Timeout for backend response headers and for each gap between body chunks, seconds
    #[arg(long, env = "BACKEND_TIMEOUT", default_value_t = 30)]
    pub backend_timeout: u64,

    // Successful requests to this path evict the caller's cached token ("" disables)
    #[arg(long, env = "SIGNOUT_PATH", default_value = "/api/auth/signout")]
    pub signout_path: String,

    // Key rate limits on the first X-Forwarded-For address instead of the peer
    #[arg(long, env = "TRUST_FORWARDED_FOR")]
    pub trust_forwarded_for: bool,

    // How often elapsed rate windows and expired cache entries are dropped, seconds
    #[arg(long, default_value_t = 60)]
    pub prune_interval: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl GatewayArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit == 0 {
            return Err(ConfigError::InvalidValue {
                name: "rate_limit",
                reason: "must be greater than 0",
            });
        }
        let positive = [
            ("rate_window", self.rate_window),
            ("broker_timeout", self.broker_timeout),
            ("backend_timeout", self.backend_timeout),
            ("prune_interval", self.prune_interval),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    name,
                    reason: "must be greater than 0",
                });
            }
        }
        Ok(())
    }

    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        let protected = self
            .routes
            .iter()
            .map(|spec| Route::new(&spec.prefix, &spec.target, true));
        let public = self
            .public_routes
            .iter()
            .map(|spec| Route::new(&spec.prefix, &spec.target, false));
        RouteTable::new(protected.chain(public).collect())
    }

    pub fn signout_path(&self) -> Option<String> {
        let path = self.signout_path.trim();
        (!path.is_empty()).then(|| path.to_string())
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn broker_timeout(&self) -> Duration {
        Duration::from_secs(self.broker_timeout)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval)
    }
}

// Identity broker CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "identity-broker")]
#[command(about = "Exchanges credentials with an OIDC identity provider for the gateway")]
pub struct BrokerArgs {
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    // IdP base URL, e.g. http://localhost:8080
    #[arg(long, env = "KEYCLOAK_AUTH_SERVER_URL", default_value = "http://localhost:8080")]
    pub idp_url: String,

    #[arg(long, env = "KEYCLOAK_REALM", default_value = "master")]
    pub realm: String,

    #[arg(long, env = "KEYCLOAK_CLIENT_ID")]
    pub client_id: String,

    #[arg(long, env = "KEYCLOAK_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    // Timeout for every IdP call, seconds
    #[arg(long, env = "IDP_TIMEOUT", default_value_t = 10)]
    pub idp_timeout: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl BrokerArgs {
    pub fn idp_timeout(&self) -> Duration {
        Duration::from_secs(self.idp_timeout)
    }
}
