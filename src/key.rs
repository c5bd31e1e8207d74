use std::sync::Arc;

use jsonwebtoken::{
    jwk::{AlgorithmParameters, Jwk},
    DecodingKey,
};

use crate::Error;

/// Which family of key material a [`PublicKey`] was derived from.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    Rsa,
    Ec,
}

/// Public key material derived from a JWK, usable as the verification secret
/// for [`jsonwebtoken::decode`].
#[derive(Clone)]
pub struct PublicKey {
    kind: KeyKind,
    decoding_key: DecodingKey,
}

impl PublicKey {
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    pub fn into_decoding_key(self) -> DecodingKey {
        self.decoding_key
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey").field("kind", &self.kind).finish()
    }
}

/// Capability seam for turning a JWK into usable public key material.
///
/// The conversion is pure and deterministic, so only the JWK itself is ever
/// cached; converted keys are rebuilt on demand.
pub trait JwkConverter: Send + Sync {
    fn convert(&self, jwk: &Jwk) -> Result<PublicKey, Error>;
}

/// Default converter backed by [`jsonwebtoken::DecodingKey`], supporting RSA
/// and elliptic-curve keys. Other key types (OKP, symmetric) fail with
/// [`Error::UnsupportedKeyType`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodingKeyConverter;

impl JwkConverter for DecodingKeyConverter {
    fn convert(&self, jwk: &Jwk) -> Result<PublicKey, Error> {
        match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map(|decoding_key| PublicKey {
                    kind: KeyKind::Rsa,
                    decoding_key,
                })
                .map_err(|error| Error::InvalidJwk(Arc::new(error))),
            AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map(|decoding_key| PublicKey {
                    kind: KeyKind::Ec,
                    decoding_key,
                })
                .map_err(|error| Error::InvalidJwk(Arc::new(error))),
            AlgorithmParameters::OctetKeyPair(_) => Err(Error::UnsupportedKeyType {
                kty: "OKP".to_string(),
            }),
            AlgorithmParameters::OctetKey(_) => Err(Error::UnsupportedKeyType {
                kty: "oct".to_string(),
            }),
        }
    }
}
