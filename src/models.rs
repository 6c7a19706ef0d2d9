use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Token metadata the gateway keeps alongside a valid verdict
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenMetadata {
    pub sub: Option<String>,
    pub username: Option<String>,
    pub client_id: Option<String>,
    pub scope: Option<String>,
    // unix seconds
    pub exp: Option<i64>,
}

/// Introspection report as relayed by the identity broker.
///
/// `active` is the only field the gateway relies on; every other claim the
/// IdP returns is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl Introspection {
    pub fn metadata(&self) -> TokenMetadata {
        serde_json::from_value(Value::Object(self.claims.clone())).unwrap_or_default()
    }
}

// IdP token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

// login answer: camelCase pair first, then everything the IdP returned
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
    #[serde(flatten)]
    pub grant: TokenGrant,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SignoutRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
}
