use super::{IdentityProvider, IdpError};
use crate::config::BrokerArgs;
use crate::models::{Introspection, TokenGrant};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

/// Keycloak-style OIDC realm: token, introspection and revocation endpoints
/// plus the admin users API.
pub struct OidcProvider {
    client: reqwest::Client,
    base_url: reqwest::Url,
    realm: String,
    client_id: String,
    client_secret: String,
}

impl OidcProvider {
    pub fn new(args: &BrokerArgs) -> Result<Self, IdpError> {
        let client = reqwest::Client::builder()
            .timeout(args.idp_timeout())
            .build()?;
        let base_url = reqwest::Url::parse(&args.idp_url)
            .map_err(|e| IdpError::InvalidUrl(format!("{}: {e}", args.idp_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(IdpError::InvalidUrl(args.idp_url.clone()));
        }

        Ok(Self {
            client,
            base_url,
            realm: args.realm.clone(),
            client_id: args.client_id.clone(),
            client_secret: args.client_secret.clone(),
        })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/{}",
            self.base_url.as_str().trim_end_matches('/'),
            self.realm,
            suffix
        )
    }

    // user_id is one opaque path segment: '/', '?' and '#' are percent-encoded
    fn user_endpoint(&self, user_id: &str) -> Result<reqwest::Url, IdpError> {
        if matches!(user_id, "" | "." | "..") {
            return Err(IdpError::InvalidUserId(user_id.to_string()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| IdpError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["admin", "realms", self.realm.as_str(), "users", user_id]);
        Ok(url)
    }

    async fn token_grant(&self, form: &[(&str, &str)]) -> Result<TokenGrant, IdpError> {
        let res = self
            .client
            .post(self.endpoint("token"))
            .form(form)
            .send()
            .await?;
        parse_json(res).await
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, IdpError> {
    let status = res.status();
    if status.is_client_error() {
        let body = res.text().await.unwrap_or_default();
        return Err(IdpError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    if !status.is_success() {
        return Err(IdpError::Upstream {
            status: status.as_u16(),
        });
    }
    Ok(res)
}

async fn parse_json<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, IdpError> {
    check_status(res)
        .await?
        .json::<T>()
        .await
        .map_err(|e| IdpError::Malformed(e.to_string()))
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    #[instrument(skip(self, password))]
    async fn login(&self, username: &str, password: &str) -> Result<TokenGrant, IdpError> {
        self.token_grant(&[
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("username", username),
            ("password", password),
        ])
        .await
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, IdpError> {
        self.token_grant(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    #[instrument(skip_all)]
    async fn introspect(&self, access_token: &str) -> Result<Introspection, IdpError> {
        let res = self
            .client
            .post(self.endpoint("token/introspect"))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("token", access_token),
                ("token_type_hint", "access_token"),
            ])
            .send()
            .await?;
        let report: Introspection = parse_json(res).await?;
        debug!(active = report.active, "introspection finished");
        Ok(report)
    }

    #[instrument(skip_all)]
    async fn revoke(&self, refresh_token: &str) -> Result<(), IdpError> {
        let res = self
            .client
            .post(self.endpoint("revoke"))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("token", refresh_token),
                ("token_type_hint", "refresh_token"),
            ])
            .send()
            .await?;
        check_status(res).await?;
        Ok(())
    }

    #[instrument(skip(self, admin_token))]
    async fn disable_user(&self, user_id: &str, admin_token: &str) -> Result<(), IdpError> {
        let res = self
            .client
            .put(self.user_endpoint(user_id)?)
            .bearer_auth(admin_token)
            .json(&serde_json::json!({ "enabled": false }))
            .send()
            .await?;
        check_status(res).await?;
        Ok(())
    }
}
