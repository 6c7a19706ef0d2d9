use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdpError {
    /// The IdP understood the call and said no (4xx).
    #[error("identity provider rejected the request with status {status}")]
    Rejected { status: u16, body: String },

    #[error("identity provider returned status {status}")]
    Upstream { status: u16 },

    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity provider sent an unexpected response: {0}")]
    Malformed(String),

    #[error("invalid identity provider URL: {0}")]
    InvalidUrl(String),

    /// Refused locally, never sent to the IdP.
    #[error("invalid user id {0:?}")]
    InvalidUserId(String),
}

impl IdpError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::InvalidUserId(_))
    }
}
