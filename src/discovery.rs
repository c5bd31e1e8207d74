use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{cache::Cache, fetch::Fetcher, Error};

/// OpenID Connect endpoint publishing the provider metadata, including the
/// `jwks_uri` the provider actually serves its keys from (which may differ
/// from the conventional `.well-known/jwks.json` path).
pub const OIDC_CONFIGURATION_ENDPOINT: &str = ".well-known/openid-configuration";

/// Maps an issuer domain to the URL of its JWKS endpoint.
///
/// With provider discovery disabled (the default) the endpoint is the issuer
/// domain with the configured well-known path appended, a pure string
/// construction. With discovery enabled, the provider metadata is fetched
/// once per issuer and the extracted `jwks_uri` is cached for the process
/// lifetime; concurrent discoveries for one issuer coalesce onto a single
/// fetch.
pub struct DiscoveryResolver {
    provider_discovery: bool,
    jwks_path: String,
    endpoints: Cache<Url>,
}

impl DiscoveryResolver {
    pub fn new(provider_discovery: bool, jwks_path: String, max: usize) -> Self {
        DiscoveryResolver {
            provider_discovery,
            jwks_path,
            endpoints: Cache::new(max, None),
        }
    }

    /// Resolves the JWKS endpoint for `domain`.
    pub async fn resolve_endpoint(&self, fetcher: &Fetcher, domain: &str) -> Result<Url, Error> {
        let base = issuer_base(domain)?;
        if !self.provider_discovery {
            return Ok(base.join(self.jwks_path.trim_start_matches('/'))?);
        }

        let discovery_url = base.join(OIDC_CONFIGURATION_ENDPOINT)?;
        let fetcher = fetcher.clone();
        let key = domain.trim_end_matches('/').to_string();
        let domain = key.clone();
        self.endpoints
            .get_or_create(&key, move || {
                async move {
                    let configuration: OpenIdConfiguration =
                        fetcher.fetch_json(discovery_url).await?;
                    let jwks_uri = configuration
                        .jwks_uri
                        .ok_or_else(|| Error::Discovery {
                            domain: domain.clone(),
                        })?;
                    debug!(%domain, %jwks_uri, "discovered JWKS endpoint");
                    Ok(Url::parse(&jwks_uri)?)
                }
                .boxed()
            })
            .await
    }
}

/// Response payload of the OpenID provider's `.well-known/openid-configuration`
/// endpoint. Only covers the field relevant in our context; `jwks_uri` stays
/// optional so its absence surfaces as [`Error::Discovery`] rather than as a
/// parse failure.
#[derive(Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    pub jwks_uri: Option<String>,
}

/// Parses the issuer domain, ensuring a trailing slash so that joining
/// well-known paths appends instead of replacing the last path segment.
fn issuer_base(domain: &str) -> Result<Url, Error> {
    let mut url = Url::parse(domain)?;
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    Ok(url)
}
