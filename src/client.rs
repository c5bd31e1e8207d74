use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use jsonwebtoken::jwk::Jwk;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    cache::Cache,
    discovery::DiscoveryResolver,
    fetch::Fetcher,
    key::{DecodingKeyConverter, JwkConverter, PublicKey},
    Error,
};

const DEFAULT_MAX_ENTRIES: usize = 100;
const DEFAULT_TTL: Duration = Duration::from_millis(60_000);
const DEFAULT_JWKS_PATH: &str = ".well-known/jwks.json";

/// The issuer/algorithm/key-id triple extracted from a JWT header and its
/// `iss` claim.
#[derive(Clone, Debug)]
pub struct KeyQuery {
    /// Issuer URL, e.g. `https://your.oidc.provider`.
    pub domain: String,
    /// Algorithm from the token header; when omitted, keys match on `kid`
    /// alone.
    pub alg: Option<String>,
    /// Key ID from the token header.
    pub kid: String,
}

/// Builder for configuring a [`JwksClient`].
pub struct JwksClientBuilder {
    max: usize,
    ttl: Duration,
    provider_discovery: bool,
    jwks_path: String,
    timeout: Option<Duration>,
    http_client: Option<Client>,
    converter: Arc<dyn JwkConverter>,
}

impl JwksClientBuilder {
    fn new() -> Self {
        JwksClientBuilder {
            max: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
            provider_discovery: false,
            jwks_path: DEFAULT_JWKS_PATH.to_string(),
            timeout: None,
            http_client: None,
            converter: Arc::new(DecodingKeyConverter),
        }
    }

    /// Maximum number of cached keys. Defaults to 100.
    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    /// Lifetime of a cached key after creation. Defaults to 60 seconds;
    /// `Duration::ZERO` disables caching.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Resolves the JWKS endpoint through the issuer's
    /// `.well-known/openid-configuration` document instead of assuming the
    /// conventional well-known path. Disabled by default.
    pub fn with_provider_discovery(mut self, enabled: bool) -> Self {
        self.provider_discovery = enabled;
        self
    }

    /// Well-known path appended to the issuer domain when provider discovery
    /// is disabled. Defaults to `.well-known/jwks.json`.
    pub fn with_jwks_path(mut self, path: impl Into<String>) -> Self {
        self.jwks_path = path.into();
        self
    }

    /// Per-request timeout for JWKS and discovery fetches. Ignored when a
    /// custom HTTP client is supplied.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Uses the given [`reqwest::Client`] for all fetches. This is the
    /// pass-through for proxy, TLS, and connection-pool configuration.
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Replaces the default JWK-to-key conversion.
    pub fn with_converter(mut self, converter: Arc<dyn JwkConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Builds the [`JwksClient`] with the configured options.
    pub fn build(self) -> JwksClient {
        let http_client = self.http_client.unwrap_or_else(|| {
            let mut builder = Client::builder();
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }
            builder.build().expect("reqwest client")
        });

        JwksClient {
            fetcher: Fetcher::new(http_client),
            discovery: Arc::new(DiscoveryResolver::new(
                self.provider_discovery,
                self.jwks_path,
                self.max,
            )),
            cache: Arc::new(Cache::new(self.max, Some(self.ttl))),
            converter: self.converter,
        }
    }
}

/// Resolves JWKs for `(domain, alg, kid)` triples, caching results so
/// repeated JWT verifications for the same issuer and key do not each
/// trigger a network round trip.
///
/// Cloning is cheap; clones share the same cache and HTTP client.
#[derive(Clone)]
pub struct JwksClient {
    fetcher: Fetcher,
    discovery: Arc<DiscoveryResolver>,
    cache: Arc<Cache<Jwk>>,
    converter: Arc<dyn JwkConverter>,
}

impl JwksClient {
    /// Creates a builder for configuring a `JwksClient`.
    pub fn builder() -> JwksClientBuilder {
        JwksClientBuilder::new()
    }

    /// Resolves the JWK for `query`.
    ///
    /// On a cache miss this resolves the issuer's JWKS endpoint, fetches the
    /// key set, and selects the first key in document order whose `kid`
    /// matches (and whose declared algorithm or key type is compatible when
    /// the query carries an `alg`). Concurrent calls for the same triple
    /// share one fetch; failures are never cached, so the next call after a
    /// failure attempts a fresh fetch.
    pub async fn get_jwk(&self, query: &KeyQuery) -> Result<Jwk, Error> {
        let cache_key = cache_key(query);
        let discovery = Arc::clone(&self.discovery);
        let fetcher = self.fetcher.clone();
        let domain = query.domain.clone();
        let kid = query.kid.clone();
        let alg = query.alg.clone();

        self.cache
            .get_or_create(&cache_key, move || {
                async move {
                    let endpoint = discovery.resolve_endpoint(&fetcher, &domain).await?;
                    debug!(%endpoint, %kid, "resolving key");
                    let document: JwksDocument = fetcher.fetch_json(endpoint).await?;
                    select_jwk(&document, &kid, alg.as_deref())
                }
                .boxed()
            })
            .await
    }

    /// Resolves the JWK for `query` and converts it to public key material
    /// usable as a verification secret.
    pub async fn get_public_key(&self, query: &KeyQuery) -> Result<PublicKey, Error> {
        let jwk = self.get_jwk(query).await?;
        self.converter.convert(&jwk)
    }

    /// The underlying key cache, for introspection, seeding, and targeted
    /// invalidation. Cache keys have the shape `"{alg}:{kid}:{domain}"` with
    /// the domain's trailing slash trimmed and an empty `alg` component when
    /// the query omitted it.
    pub fn cache(&self) -> &Cache<Jwk> {
        &self.cache
    }

    /// Drops the cached key for `query`, e.g. after a downstream signature
    /// verification failure that suggests the issuer rotated its keys.
    pub fn invalidate(&self, query: &KeyQuery) {
        self.cache.invalidate(&cache_key(query));
    }

    /// Drops every cached key.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }
}

/// JWK Set document shape. Keys are kept verbatim; only the selected one is
/// parsed into a typed [`Jwk`].
#[derive(Deserialize)]
struct JwksDocument {
    keys: Vec<Value>,
}

fn cache_key(query: &KeyQuery) -> String {
    format!(
        "{}:{}:{}",
        query.alg.as_deref().unwrap_or(""),
        query.kid,
        query.domain.trim_end_matches('/')
    )
}

fn select_jwk(document: &JwksDocument, kid: &str, alg: Option<&str>) -> Result<Jwk, Error> {
    let mut incompatible = None;

    for key in &document.keys {
        if key.get("kid").and_then(Value::as_str) != Some(kid) {
            continue;
        }
        let Some(requested) = alg else {
            return parse_jwk(key);
        };
        match key.get("alg").and_then(Value::as_str) {
            Some(declared) if declared == requested => return parse_jwk(key),
            Some(declared) => {
                incompatible.get_or_insert_with(|| declared.to_string());
            }
            None => {
                let kty = key.get("kty").and_then(Value::as_str).unwrap_or("");
                if family_matches(requested, kty) {
                    return parse_jwk(key);
                }
                incompatible.get_or_insert_with(|| kty.to_string());
            }
        }
    }

    match (incompatible, alg) {
        (Some(found), Some(requested)) => Err(Error::KeyMismatch {
            kid: kid.to_string(),
            requested: requested.to_string(),
            found,
        }),
        _ => Err(Error::KeyNotFound {
            kid: kid.to_string(),
        }),
    }
}

fn parse_jwk(key: &Value) -> Result<Jwk, Error> {
    serde_json::from_value(key.clone()).map_err(|error| Error::Parse(Arc::new(error)))
}

/// Whether a JWK's key type can carry signatures for the requested
/// algorithm. Unknown algorithm names put no constraint on the key type.
fn family_matches(alg: &str, kty: &str) -> bool {
    match alg {
        a if a.starts_with("RS") || a.starts_with("PS") => kty == "RSA",
        a if a.starts_with("ES") => kty == "EC",
        "EdDSA" => kty == "OKP",
        a if a.starts_with("HS") => kty == "oct",
        _ => true,
    }
}
