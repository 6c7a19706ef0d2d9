//! Identity broker: the only component that talks to the upstream IdP.
//!
//! The HTTP surface in [`handlers`] works against the [`IdentityProvider`]
//! trait, so the upstream can be swapped without touching the gateway.

pub mod error;
pub mod handlers;
pub mod oidc;

pub use error::IdpError;
pub use handlers::{BrokerState, router};
pub use oidc::OidcProvider;

use crate::models::{Introspection, TokenGrant};
use async_trait::async_trait;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resource owner password grant.
    async fn login(&self, username: &str, password: &str) -> Result<TokenGrant, IdpError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, IdpError>;

    async fn introspect(&self, access_token: &str) -> Result<Introspection, IdpError>;

    async fn revoke(&self, refresh_token: &str) -> Result<(), IdpError>;

    /// Disable a user account, authorized by the caller's admin token.
    async fn disable_user(&self, user_id: &str, admin_token: &str) -> Result<(), IdpError>;
}
