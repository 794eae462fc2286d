//! JWKS (JSON Web Key Set) fetching and caching for RS256 session tokens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default cache TTL in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Maximum stale cache age in seconds (24 hours).
pub const MAX_STALE_CACHE_SECONDS: u64 = 86400;

/// Minimum gap between two fetches, whatever the outcome of the first.
pub const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(5);

/// Key id used for keys published without a `kid`.
const DEFAULT_KID: &str = "default";

/// A single JSON Web Key from a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA")
    pub kty: String,
    /// Key ID, matched against the token header `kid`
    pub kid: Option<String>,
    /// Algorithm (e.g., "RS256")
    pub alg: Option<String>,
    /// Key use ("sig" or "enc")
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url encoded)
    pub n: Option<String>,
    /// RSA exponent (base64url encoded)
    pub e: Option<String>,
}

/// A JWKS document containing multiple keys.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Thread-safe JWKS cache with refresh on expiry or unknown `kid`.
pub struct JwksCache {
    jwks_url: String,
    cache_ttl: Duration,
    /// Serve keys from an expired cache when the endpoint is down.
    allow_stale: bool,
    keys: Arc<RwLock<HashMap<String, DecodingKey>>>,
    last_fetch: Arc<RwLock<Option<Instant>>>,
    /// Last fetch attempt, successful or not.
    last_attempt: Arc<RwLock<Option<Instant>>>,
    client: reqwest::Client,
}

impl JwksCache {
    pub fn new(jwks_url: String, cache_ttl_seconds: u64, allow_stale: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            jwks_url,
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            allow_stale,
            keys: Arc::new(RwLock::new(HashMap::new())),
            last_fetch: Arc::new(RwLock::new(None)),
            last_attempt: Arc::new(RwLock::new(None)),
            client,
        }
    }

    /// Get a decoding key by key ID.
    ///
    /// If `kid` is None, returns any cached key. Fetches from the endpoint
    /// when the cache is stale or the key is unknown, at most once per
    /// `MIN_REFETCH_INTERVAL`.
    pub async fn get_key(&self, kid: Option<&str>) -> Result<DecodingKey, JwksCacheError> {
        let fresh = {
            let last_fetch = self.last_fetch.read().await;
            last_fetch.is_some_and(|t| t.elapsed() <= self.cache_ttl)
        };

        if fresh && let Some(key) = self.get_from_cache(kid).await {
            return Ok(key);
        }

        // Unknown kids must not turn into one endpoint round trip per request
        if self.recently_attempted().await {
            debug!("JWKS refetch skipped, last attempt too recent");
            let usable = fresh || (self.allow_stale && self.stale_usable().await);
            if usable && let Some(key) = self.get_from_cache(kid).await {
                return Ok(key);
            }
            return Err(Self::missing(kid));
        }

        match self.fetch_keys().await {
            Ok(()) => self
                .get_from_cache(kid)
                .await
                .ok_or_else(|| Self::missing(kid)),
            Err(e) => {
                if self.allow_stale && self.stale_usable().await {
                    warn!("JWKS fetch failed, using stale cache: {}", e);
                    if let Some(key) = self.get_from_cache(kid).await {
                        return Ok(key);
                    }
                }
                Err(e)
            }
        }
    }

    fn missing(kid: Option<&str>) -> JwksCacheError {
        match kid {
            Some(k) => JwksCacheError::KeyNotFound(k.to_string()),
            None => JwksCacheError::NoKeysAvailable,
        }
    }

    async fn recently_attempted(&self) -> bool {
        self.last_attempt
            .read()
            .await
            .is_some_and(|t| t.elapsed() < MIN_REFETCH_INTERVAL)
    }

    async fn stale_usable(&self) -> bool {
        self.last_fetch
            .read()
            .await
            .is_some_and(|t| t.elapsed() < Duration::from_secs(MAX_STALE_CACHE_SECONDS))
    }

    async fn get_from_cache(&self, kid: Option<&str>) -> Option<DecodingKey> {
        let keys = self.keys.read().await;
        match kid {
            Some(k) => keys.get(k).cloned(),
            None => keys
                .get(DEFAULT_KID)
                .or_else(|| keys.values().next())
                .cloned(),
        }
    }

    /// Fetch keys from the JWKS endpoint, replacing the cache on success.
    pub async fn fetch_keys(&self) -> Result<(), JwksCacheError> {
        debug!("Fetching JWKS from {}", self.jwks_url);
        *self.last_attempt.write().await = Some(Instant::now());

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| JwksCacheError::FetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JwksCacheError::FetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwksDocument = response
            .json()
            .await
            .map_err(|e| JwksCacheError::ParseError(e.to_string()))?;

        let new_keys = Self::decode_document(jwks);
        if new_keys.is_empty() {
            return Err(JwksCacheError::NoValidKeys);
        }

        let count = new_keys.len();
        *self.keys.write().await = new_keys;
        *self.last_fetch.write().await = Some(Instant::now());

        debug!("Cached {} JWKS keys", count);
        Ok(())
    }

    /// Keep the RSA signing keys of a document, keyed by `kid`.
    fn decode_document(jwks: JwksDocument) -> HashMap<String, DecodingKey> {
        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                debug!("Skipping non-RSA key: {:?}", jwk.kty);
                continue;
            }
            if jwk.key_use.as_deref() == Some("enc") {
                debug!("Skipping encryption key");
                continue;
            }

            match Self::jwk_to_decoding_key(&jwk) {
                Ok(key) => {
                    let kid = jwk.kid.clone().unwrap_or_else(|| DEFAULT_KID.to_string());
                    keys.insert(kid, key);
                }
                Err(e) => warn!("Failed to parse JWK: {}", e),
            }
        }
        keys
    }

    fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, JwksCacheError> {
        let n = jwk
            .n
            .as_ref()
            .ok_or_else(|| JwksCacheError::ParseError("Missing 'n' in RSA key".to_string()))?;
        let e = jwk
            .e
            .as_ref()
            .ok_or_else(|| JwksCacheError::ParseError("Missing 'e' in RSA key".to_string()))?;

        DecodingKey::from_rsa_components(n, e)
            .map_err(|e| JwksCacheError::ParseError(format!("Invalid RSA components: {}", e)))
    }

    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }
}

/// Errors that can occur when working with the JWKS cache.
#[derive(Debug, Clone)]
pub enum JwksCacheError {
    /// Failed to fetch JWKS from endpoint.
    FetchError(String),
    /// Failed to parse JWKS response.
    ParseError(String),
    /// No valid keys found in JWKS.
    NoValidKeys,
    /// Key with specified kid not found.
    KeyNotFound(String),
    /// No keys available in cache.
    NoKeysAvailable,
}

impl std::fmt::Display for JwksCacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FetchError(msg) => write!(f, "Failed to fetch JWKS: {}", msg),
            Self::ParseError(msg) => write!(f, "Failed to parse JWKS: {}", msg),
            Self::NoValidKeys => write!(f, "No valid keys found in JWKS"),
            Self::KeyNotFound(kid) => write!(f, "Key not found: {}", kid),
            Self::NoKeysAvailable => write!(f, "No keys available in cache"),
        }
    }
}

impl std::error::Error for JwksCacheError {}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::get};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serve a one-key JWKS document, counting requests.
    async fn serve_counting_jwks(kid: &'static str, hits: Arc<AtomicUsize>) -> String {
        let doc = serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "kid": kid,
                "use": "sig",
                "n": include_str!("testdata/session_rsa.n").trim(),
                "e": "AQAB",
            }]
        });
        let app = Router::new().route(
            "/jwks.json",
            get(move || {
                let doc = doc.clone();
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(doc)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/jwks.json", addr)
    }

    #[test]
    fn test_jwks_cache_error_display() {
        let err = JwksCacheError::FetchError("timeout".to_string());
        assert_eq!(err.to_string(), "Failed to fetch JWKS: timeout");

        let err = JwksCacheError::KeyNotFound("key123".to_string());
        assert_eq!(err.to_string(), "Key not found: key123");
    }

    #[test]
    fn test_decode_document_skips_unusable_keys() {
        let json = format!(
            r#"{{
                "keys": [
                    {{ "kty": "RSA", "kid": "sig-1", "use": "sig", "n": "{n}", "e": "AQAB" }},
                    {{ "kty": "RSA", "kid": "enc-1", "use": "enc", "n": "{n}", "e": "AQAB" }},
                    {{ "kty": "EC", "kid": "ec-1" }},
                    {{ "kty": "RSA", "kid": "broken" }}
                ]
            }}"#,
            n = include_str!("testdata/session_rsa.n").trim()
        );

        let doc: JwksDocument = serde_json::from_str(&json).unwrap();
        let keys = JwksCache::decode_document(doc);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key("sig-1"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fetch_error() {
        let cache = JwksCache::new("http://127.0.0.1:9/jwks.json".to_string(), 3600, true);

        let err = cache.get_key(Some("any")).await.unwrap_err();
        assert!(matches!(err, JwksCacheError::FetchError(_)));
        assert_eq!(cache.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_kid_does_not_refetch_every_time() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = serve_counting_jwks("known", hits.clone()).await;
        let cache = JwksCache::new(url, 3600, true);

        assert!(cache.get_key(Some("known")).await.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        for i in 0..5 {
            let kid = format!("forged-{}", i);
            let err = cache.get_key(Some(kid.as_str())).await.unwrap_err();
            assert!(matches!(err, JwksCacheError::KeyNotFound(k) if k == kid));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Known keys are still served from the cache
        assert!(cache.get_key(Some("known")).await.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_retried_immediately() {
        let cache = JwksCache::new("http://127.0.0.1:9/jwks.json".to_string(), 3600, true);

        let err = cache.get_key(Some("any")).await.unwrap_err();
        assert!(matches!(err, JwksCacheError::FetchError(_)));

        let err = cache.get_key(Some("any")).await.unwrap_err();
        assert!(matches!(err, JwksCacheError::KeyNotFound(_)));
    }
}
