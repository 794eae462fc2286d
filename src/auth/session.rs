//! Session token verification.
//!
//! A session token is a signed, self-describing token whose `sub` claim is a
//! user id. Two verifiers are provided: a shared-secret HS256 verifier for
//! single-issuer deployments, and an RS256 verifier that fetches signing keys
//! from a JWKS endpoint.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::jwks::{DEFAULT_CACHE_TTL_SECONDS, JwksCache};
use crate::types::UserId;

/// Claims read from a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the user id
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    #[serde(default)]
    pub iss: Option<String>,
}

/// Session token settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Shared secret for HS256 tokens
    #[serde(default)]
    pub secret: Option<String>,
    /// JWKS endpoint for RS256 tokens. Takes precedence over `secret`.
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default = "default_jwks_cache_seconds")]
    pub jwks_cache_seconds: u64,
    #[serde(default = "default_allow_stale_jwks")]
    pub allow_stale_jwks: bool,
}

fn default_jwks_cache_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}

fn default_allow_stale_jwks() -> bool {
    true
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("jwks_url", &self.jwks_url)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("jwks_cache_seconds", &self.jwks_cache_seconds)
            .field("allow_stale_jwks", &self.allow_stale_jwks)
            .finish()
    }
}

impl SessionConfig {
    /// Build the configured verifier, if any.
    pub fn verifier(&self) -> Option<Arc<dyn SessionVerifier>> {
        if let Some(url) = &self.jwks_url {
            let cache = JwksCache::new(url.clone(), self.jwks_cache_seconds, self.allow_stale_jwks);
            return Some(Arc::new(JwksSessionVerifier::new(
                cache,
                self.issuer.clone(),
                self.audience.clone(),
            )));
        }

        self.secret.as_ref().map(|secret| {
            Arc::new(HmacSessionVerifier::new(
                secret.as_bytes(),
                self.issuer.clone(),
                self.audience.clone(),
            )) as Arc<dyn SessionVerifier>
        })
    }
}

/// Why a session token was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Malformed(String),
    Expired,
    InvalidSignature,
    /// Issuer, audience or another claim check failed
    Rejected(String),
    /// No key could be obtained to check the signature
    KeyUnavailable(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed session token: {}", msg),
            Self::Expired => write!(f, "Session token expired"),
            Self::InvalidSignature => write!(f, "Invalid session token signature"),
            Self::Rejected(msg) => write!(f, "Session token rejected: {}", msg),
            Self::KeyUnavailable(msg) => write!(f, "Signing key unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<jsonwebtoken::errors::Error> for SessionError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::Rejected(err.to_string()),
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Verifies a session token and yields its subject.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId, SessionError>;
}

fn validation(algorithm: Algorithm, issuer: Option<&str>, audience: Option<&str>) -> Validation {
    let mut validation = Validation::new(algorithm);
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }
    match audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }
    validation
}

fn subject(claims: SessionClaims) -> Result<UserId, SessionError> {
    let sub = claims.sub.trim();
    if sub.is_empty() {
        return Err(SessionError::Rejected("empty subject".to_string()));
    }
    Ok(UserId::new(sub))
}

/// HS256 verifier with a shared secret.
pub struct HmacSessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl HmacSessionVerifier {
    pub fn new(secret: &[u8], issuer: Option<String>, audience: Option<String>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: validation(Algorithm::HS256, issuer.as_deref(), audience.as_deref()),
        }
    }
}

#[async_trait]
impl SessionVerifier for HmacSessionVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, SessionError> {
        let data = decode::<SessionClaims>(token, &self.key, &self.validation)?;
        subject(data.claims)
    }
}

/// RS256 verifier backed by a JWKS endpoint.
pub struct JwksSessionVerifier {
    jwks: JwksCache,
    validation: Validation,
}

impl JwksSessionVerifier {
    pub fn new(jwks: JwksCache, issuer: Option<String>, audience: Option<String>) -> Self {
        Self {
            jwks,
            validation: validation(Algorithm::RS256, issuer.as_deref(), audience.as_deref()),
        }
    }
}

#[async_trait]
impl SessionVerifier for JwksSessionVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, SessionError> {
        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(SessionError::Rejected(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }

        let key = self
            .jwks
            .get_key(header.kid.as_deref())
            .await
            .map_err(|e| SessionError::KeyUnavailable(e.to_string()))?;

        let data = decode::<SessionClaims>(token, &key, &self.validation)?;
        debug!(sub = %data.claims.sub, "session token verified");
        subject(data.claims)
    }
}
