//! Fetch, cache, and convert [JSON Web Keys (JWK)](https://datatracker.ietf.org/doc/html/rfc7517)
//! for JWT signature verification.
//!
//! ## Overview
//!
//! OpenID Connect providers and OAuth2 authorization servers publish the
//! public keys their tokens are signed with as a JWK set, typically at
//! `.well-known/jwks.json` under the issuer domain. A JWT library verifying a
//! token needs the one key identified by the token header's `kid` (and `alg`)
//! and the `iss` claim — and it needs it on every verification, so fetching
//! the set over HTTPS each time is not an option.
//!
//! This crate resolves `{domain, alg, kid}` triples to JWKs (or to ready-made
//! public key material) behind a bounded, TTL-expiring cache:
//!
//! - **Caching**: resolved keys are cached per `(alg, kid, domain)` with a
//!   configurable entry lifetime and maximum size (oldest-inserted entries
//!   are evicted first). Failed lookups are never cached, so transient
//!   network issues heal on the next call.
//! - **Request coalescing**: concurrent resolutions for the same triple
//!   share a single in-flight fetch, so a burst of verifications after a key
//!   rotation produces one request to the provider, not hundreds.
//! - **Provider discovery**: optionally the JWKS endpoint is taken from the
//!   issuer's `.well-known/openid-configuration` document (some providers
//!   serve their keys somewhere other than the conventional path); the
//!   discovered endpoint is cached per issuer.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use jwks_client::{JwksClient, KeyQuery};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JwksClient::builder()
//!         .with_ttl(Duration::from_secs(300))
//!         .with_timeout(Duration::from_secs(5))
//!         .build();
//!
//!     // `domain`, `alg`, and `kid` come from the token being verified:
//!     // the header carries `alg` and `kid`, the payload carries `iss`.
//!     let public_key = client
//!         .get_public_key(&KeyQuery {
//!             domain: "https://your.oidc.provider".to_string(),
//!             alg: Some("RS256".to_string()),
//!             kid: "key-1".to_string(),
//!         })
//!         .await?;
//!
//!     // `public_key.decoding_key()` plugs straight into `jsonwebtoken::decode`.
//!     Ok(())
//! }
//! ```
//!
//! This crate does not verify signatures or validate claims itself; it is the
//! key-resolution side of a verification setup built on e.g.
//! [`jsonwebtoken`].

pub use cache::Cache;
pub use client::{JwksClient, JwksClientBuilder, KeyQuery};
pub use discovery::{DiscoveryResolver, OpenIdConfiguration};
pub use error::Error;
pub use fetch::Fetcher;
pub use key::{DecodingKeyConverter, JwkConverter, KeyKind, PublicKey};

pub use jsonwebtoken::jwk::Jwk;

mod cache;
mod client;
mod discovery;
mod error;
mod fetch;
mod key;
