use std::sync::Arc;

use http::StatusCode;

/// Errors surfaced by [`crate::JwksClient`] and its collaborators.
///
/// All variants are `Clone` (sources are wrapped in [`Arc`]) so that every
/// caller coalesced onto a single in-flight fetch can observe the same
/// failure.
#[non_exhaustive]
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("failed to reach the endpoint")]
    Network(#[source] Arc<reqwest::Error>),
    #[error("received error response from the endpoint: {status_code}")]
    ErrorResponse { status_code: StatusCode },
    #[error("failed to parse JSON response")]
    Parse(#[source] Arc<serde_json::Error>),
    #[error("discovery document for {domain} is missing `jwks_uri`")]
    Discovery { domain: String },
    #[error("no JWK found for kid {kid}")]
    KeyNotFound { kid: String },
    #[error("JWK for kid {kid} is not usable with {requested}, found {found}")]
    KeyMismatch {
        kid: String,
        requested: String,
        found: String,
    },
    #[error("unsupported JWK key type {kty}")]
    UnsupportedKeyType { kty: String },
    #[error("failed to decode JWK into key")]
    InvalidJwk(#[source] Arc<jsonwebtoken::errors::Error>),
    #[error("invalid URL")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Network(Arc::new(error))
    }
}
